use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewAuthor {
    /// OpenLibrary author page, the author's identity in the catalog.
    pub url: String,
    pub name: String,
}

impl NewAuthor {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

impl From<Author> for NewAuthor {
    fn from(author: Author) -> Self {
        Self {
            url: author.url,
            name: author.name,
        }
    }
}
