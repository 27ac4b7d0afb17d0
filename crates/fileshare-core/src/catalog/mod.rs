//! 文件目录
//!
//! 每个上传过的文件名对应一条记录（名称、存储路径、首次上传时间）。
//!
//! # 唯一性
//!
//! 文件名唯一。重复上传同名文件只覆盖磁盘上的字节，不会新增记录，
//! 也不会刷新 `uploaded_at`。插入在同一个事务里完成
//! (`INSERT ... ON CONFLICT DO NOTHING` 后回读)，连接由互斥锁保护，
//! 并发上传同名文件不会产生重复记录。

mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use schema::CREATE_SCHEMA;

/// 文件目录错误
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid timestamp in catalog: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog lock poisoned")]
    Poisoned,
}

/// 目录中的一条文件记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// 数据库行 ID
    pub id: i64,
    /// 原始文件名（客户端使用的外部标识）
    pub name: String,
    /// 上传目录下的绝对存储路径
    pub storage_path: PathBuf,
    /// 首次上传时间 (UTC)
    pub uploaded_at: DateTime<Utc>,
}

/// SQLite 文件目录
///
/// 可廉价克隆，所有克隆共享同一个连接。
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    /// 打开（或创建）目录数据库
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;",
        )?;
        conn.execute_batch(CREATE_SCHEMA)?;
        debug!("Opened catalog at {:?}", path);

        Ok(Self::from_connection(conn))
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::Poisoned)
    }

    /// 仅当 `name` 不存在时插入记录
    ///
    /// 返回已有的或新建的记录。重复名称不是错误。
    pub fn insert_if_absent(&self, name: &str, path: &Path) -> Result<FileRecord, CatalogError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO files (name, path, uploaded_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO NOTHING",
            params![
                name,
                path.to_string_lossy().into_owned(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        let record = find_record(&tx, name)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;

        if inserted > 0 {
            debug!("Catalog: added {} (id={})", record.name, record.id);
        } else {
            debug!("Catalog: {} already recorded, keeping metadata", record.name);
        }

        Ok(record)
    }

    /// 所有文件名，按插入顺序
    pub fn list_all(&self) -> Result<Vec<String>, CatalogError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM files ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// 按名称查询单条记录
    pub fn get(&self, name: &str) -> Result<Option<FileRecord>, CatalogError> {
        let conn = self.lock()?;
        find_record(&conn, name)
    }
}

fn find_record(conn: &Connection, name: &str) -> Result<Option<FileRecord>, CatalogError> {
    let row = conn
        .query_row(
            "SELECT id, name, path, uploaded_at FROM files WHERE name = ?1",
            params![name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, path, uploaded_at)) = row else {
        return Ok(None);
    };

    Ok(Some(FileRecord {
        id,
        name,
        storage_path: PathBuf::from(path),
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)?.with_timezone(&Utc),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn insert_creates_record() {
        let catalog = Catalog::open_in_memory().unwrap();
        let record = catalog
            .insert_if_absent("a.txt", Path::new("/srv/uploads/a.txt"))
            .unwrap();

        assert_eq!(record.name, "a.txt");
        assert_eq!(record.storage_path, PathBuf::from("/srv/uploads/a.txt"));
        assert!(record.id > 0);
    }

    #[test]
    fn duplicate_insert_keeps_first_record() {
        let catalog = Catalog::open_in_memory().unwrap();
        let first = catalog
            .insert_if_absent("a.txt", Path::new("/srv/uploads/a.txt"))
            .unwrap();
        let second = catalog
            .insert_if_absent("a.txt", Path::new("/elsewhere/a.txt"))
            .unwrap();

        // 第二次插入是空操作：同一 ID、同一时间戳、原路径
        assert_eq!(first, second);
        assert_eq!(catalog.list_all().unwrap(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn list_all_keeps_insertion_order() {
        let catalog = Catalog::open_in_memory().unwrap();
        for name in ["zeta.bin", "alpha.txt", "mid.md"] {
            catalog.insert_if_absent(name, Path::new(name)).unwrap();
        }
        assert_eq!(
            catalog.list_all().unwrap(),
            vec!["zeta.bin", "alpha.txt", "mid.md"]
        );
    }

    #[test]
    fn get_missing_returns_none() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(catalog.get("nope.txt").unwrap().is_none());
    }

    #[test]
    fn open_creates_database_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("catalog.sqlite3");
        let catalog = Catalog::open(&path).unwrap();
        catalog.insert_if_absent("x", Path::new("x")).unwrap();
        assert!(path.exists());

        // 重新打开后记录仍在
        drop(catalog);
        let reopened = Catalog::open(&path).unwrap();
        assert_eq!(reopened.list_all().unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn concurrent_inserts_of_same_name_yield_one_record() {
        let tmp = TempDir::new().unwrap();
        let catalog = Catalog::open(&tmp.path().join("catalog.sqlite3")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let catalog = catalog.clone();
                std::thread::spawn(move || {
                    catalog
                        .insert_if_absent("shared.txt", Path::new(&format!("/p/{i}")))
                        .unwrap()
                })
            })
            .collect();

        let records: Vec<FileRecord> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(records.iter().all(|r| r.id == records[0].id));
        assert_eq!(catalog.list_all().unwrap().len(), 1);
    }
}
