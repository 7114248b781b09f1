mod author;
mod book;
mod record;
mod subject;

pub use author::{Author, NewAuthor};
pub use book::{Book, NewBook};
pub use record::BookRecord;
pub use subject::Subject;
