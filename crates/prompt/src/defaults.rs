//! Built-in prompt definitions.
//!
//! A workspace can replace any of these with `.policypro/prompts/<id>.yml`.

use crate::types::{PromptBehavior, PromptDefinition, PromptOutputSpec};

pub const AGENT_SYSTEM: &str = "agent.system";
pub const MEMORY_SUMMARIZE: &str = "memory.summarize";
pub const RETRIEVAL_SELF_QUERY: &str = "retrieval.self_query";

/// Every prompt id the assistant renders.
pub const BUILTIN_IDS: [&str; 3] = [AGENT_SYSTEM, MEMORY_SUMMARIZE, RETRIEVAL_SELF_QUERY];

const AGENT_SYSTEM_TEMPLATE: &str = r#"Eres un asistente bien informado centrado en pólizas de seguro y documentos.
Utilizando el contexto proporcionado de nuestra base de datos de pólizas de seguros ({{document_description}}), responde a la pregunta del usuario relacionada con seguros.
Solo hablas español.
Asegúrate de proporcionar sólo información relevante al contenido de los contratos y pólizas de seguro y evita responder a preguntas no relacionadas con este dominio.
Utiliza tu herramienta "{{retriever_tool}}" para buscar información relevante en las pólizas.
Solo puedes usar tu herramienta "{{web_search_tool}}" si el usuario te lo pide explícitamente diciendo "busca en google" o una de estas frases: {{web_search_triggers}}. No lo hagas si no te lo pide explícitamente.
Si no sabes la respuesta, simplemente di que no lo sabes, no intentes inventar una respuesta.
Mantén la respuesta lo más concisa posible."#;

const MEMORY_SUMMARIZE_TEMPLATE: &str = r#"Resume progresivamente las líneas de conversación proporcionadas, añadiéndolas al resumen anterior y devolviendo un nuevo resumen. Conserva los números de póliza, páginas y datos concretos mencionados.

Resumen actual:
{{summary}}

Nuevas líneas de conversación:
{{new_lines}}

Nuevo resumen:"#;

const RETRIEVAL_SELF_QUERY_TEMPLATE: &str = r#"Tu tarea es convertir la pregunta del usuario en una consulta estructurada para buscar en una colección de documentos.

Contenido de los documentos: {{content_description}}

Atributos de metadatos que se pueden filtrar:
{{attributes}}

Responde únicamente con un objeto JSON con esta forma:
{"query": "<texto a buscar por similitud semántica>", "filter": [{"attribute": "<atributo>", "comparator": "eq|ne|gt|gte|lt|lte", "value": <valor>}]}

Reglas:
- Usa solo los atributos listados arriba.
- Si la pregunta no menciona ningún atributo filtrable, devuelve "filter": [] y la pregunta completa en "query".
- "query" no debe repetir las condiciones ya expresadas en "filter".

Pregunta: {{query}}"#;

fn definition(
    id: &str,
    title: &str,
    variables: &[&str],
    template: &str,
    format: &str,
) -> PromptDefinition {
    PromptDefinition {
        id: id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        created_by: "builtin".to_string(),
        behavior: PromptBehavior::default(),
        variables: variables.iter().map(|v| v.to_string()).collect(),
        template: template.to_string(),
        output: PromptOutputSpec {
            format: format.to_string(),
        },
    }
}

/// Look up the built-in definition for `id`.
pub fn builtin(id: &str) -> Option<PromptDefinition> {
    match id {
        AGENT_SYSTEM => Some(definition(
            AGENT_SYSTEM,
            "Instrucción de sistema del asistente de pólizas",
            &[
                "document_description",
                "retriever_tool",
                "web_search_tool",
                "web_search_triggers",
            ],
            AGENT_SYSTEM_TEMPLATE,
            "text",
        )),
        MEMORY_SUMMARIZE => Some(definition(
            MEMORY_SUMMARIZE,
            "Resumen progresivo de la conversación",
            &["summary", "new_lines"],
            MEMORY_SUMMARIZE_TEMPLATE,
            "text",
        )),
        RETRIEVAL_SELF_QUERY => Some(definition(
            RETRIEVAL_SELF_QUERY,
            "Traducción de preguntas a consultas estructuradas",
            &["content_description", "attributes", "query"],
            RETRIEVAL_SELF_QUERY_TEMPLATE,
            "json",
        )),
        _ => None,
    }
}
