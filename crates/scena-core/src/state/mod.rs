pub mod model;
pub mod repository;

pub use model::EditorState;
pub use repository::EditorStateRepository;
