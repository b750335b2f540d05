pub mod mock;
pub mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiEmbeddings;
