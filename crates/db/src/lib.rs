pub mod error;
pub mod models;
pub mod store;

pub use error::DbError;
pub use models::{
    BulletCitation, DeckBullet, DeckSection, DeckSubsection, Document, DocumentImage,
    DocumentStatus, Job, JobStatus, NewBullet, NewDeck, NewDocumentImage, NewSection, NewSpan,
    NewSubsection, SourceSpan,
};
pub use store::Db;
