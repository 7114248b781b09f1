pub const SCHEMA: &str = r#"
-- book table
CREATE TABLE IF NOT EXISTS book (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    isbn TEXT UNIQUE NOT NULL,
    url TEXT UNIQUE NOT NULL,
    title TEXT NOT NULL,
    subtitle TEXT,
    cover_url TEXT UNIQUE
);

-- author table
CREATE TABLE IF NOT EXISTS author (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT UNIQUE NOT NULL,
    name TEXT NOT NULL
);

-- subject table
CREATE TABLE IF NOT EXISTS subject (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sub_name TEXT UNIQUE NOT NULL
);

-- book_author table
CREATE TABLE IF NOT EXISTS book_author (
    b_id INTEGER NOT NULL REFERENCES book(id),
    a_id INTEGER NOT NULL REFERENCES author(id),
    PRIMARY KEY (b_id, a_id)
);

CREATE INDEX IF NOT EXISTS idx_book_author_a_id ON book_author(a_id);

-- book_subject table
CREATE TABLE IF NOT EXISTS book_subject (
    b_id INTEGER NOT NULL REFERENCES book(id),
    s_id INTEGER NOT NULL REFERENCES subject(id),
    PRIMARY KEY (b_id, s_id)
);

CREATE INDEX IF NOT EXISTS idx_book_subject_s_id ON book_subject(s_id);
"#;
