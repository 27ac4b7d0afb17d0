/// 文件目录表结构
pub const CREATE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    path TEXT NOT NULL,
    uploaded_at TEXT NOT NULL
);
";
