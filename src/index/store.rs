use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{migrate, Db};
use crate::error::{Result, RagagentError};
use crate::index::vector::{IndexEntry, VectorIndex};
use crate::ingest::{Chunk, HashLedger};

/// Metadata of the last persisted generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
    pub number: u64,
    pub dimensions: Option<usize>,
    pub chunk_count: usize,
    pub committed_at: String,
}

/// Durable home of the vector index and its hash ledger.
///
/// Both live in one SQLite file and are only ever written together, inside a
/// single transaction, so a restored index always comes with the ledger that
/// describes it.
#[derive(Debug, Clone)]
pub struct IndexStore {
    db: Db,
}

impl IndexStore {
    /// Open (or create) the store and apply pending migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        db.with_connection(|conn| migrate::run_migrations(conn)).await?;
        Ok(Self { db })
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// Last persisted ledger; empty when nothing has been saved yet.
    pub async fn load_ledger(&self) -> Result<HashLedger> {
        self.db.with_connection(|conn| read_ledger(conn)).await
    }

    /// Overwrite only the ledger, leaving index rows alone.
    pub async fn save_ledger(&self, ledger: &HashLedger) -> Result<()> {
        let ledger = ledger.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                write_ledger(&tx, &ledger)?;
                tx.commit()?;
                Ok(())
            })
            .await
    }

    pub async fn generation(&self) -> Result<Option<GenerationInfo>> {
        self.db.with_connection(|conn| read_generation(conn)).await
    }

    /// Rebuild the last persisted index. `None` when no generation exists.
    pub async fn restore(&self) -> Result<Option<(VectorIndex, GenerationInfo)>> {
        self.db
            .with_connection(|conn| {
                let Some(info) = read_generation(conn)? else {
                    return Ok(None);
                };
                let entries = read_entries(conn)?;
                if entries.len() != info.chunk_count {
                    return Err(RagagentError::Index(format!(
                        "generation {} expects {} chunks, found {}",
                        info.number,
                        info.chunk_count,
                        entries.len()
                    )));
                }
                let index = VectorIndex::from_entries(entries)?;
                if index.dimensions().is_some() && index.dimensions() != info.dimensions {
                    return Err(RagagentError::Index(format!(
                        "generation {} dimension mismatch",
                        info.number
                    )));
                }
                Ok(Some((index, info)))
            })
            .await
    }

    /// Write index, ledger and a new generation row in one transaction.
    pub async fn persist(&self, index: &VectorIndex, ledger: &HashLedger) -> Result<GenerationInfo> {
        let index = index.clone();
        let ledger = ledger.clone();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;

                tx.execute("DELETE FROM chunks", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO chunks (seq, chunk_id, doc_path, doc_digest, position, chunk_text, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for (seq, entry) in index.entries().enumerate() {
                        let chunk = &entry.chunk;
                        stmt.execute(params![
                            seq as i64,
                            chunk.chunk_id,
                            chunk.doc_path,
                            chunk.doc_digest,
                            chunk.position as i64,
                            chunk.text,
                            encode_embedding(&entry.embedding),
                        ])?;
                    }
                }

                write_ledger(&tx, &ledger)?;

                let previous: Option<i64> = tx
                    .query_row("SELECT number FROM generation WHERE id = 1", [], |r| r.get(0))
                    .optional()?;
                let info = GenerationInfo {
                    number: previous.map_or(1, |n| n as u64 + 1),
                    dimensions: index.dimensions(),
                    chunk_count: index.len(),
                    committed_at: chrono::Utc::now().to_rfc3339(),
                };
                tx.execute(
                    "INSERT INTO generation (id, number, dimensions, chunk_count, committed_at)
                     VALUES (1, ?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        number = excluded.number,
                        dimensions = excluded.dimensions,
                        chunk_count = excluded.chunk_count,
                        committed_at = excluded.committed_at",
                    params![
                        info.number as i64,
                        info.dimensions.map(|d| d as i64),
                        info.chunk_count as i64,
                        info.committed_at,
                    ],
                )?;

                tx.commit()?;
                Ok(info)
            })
            .await
    }
}

fn read_ledger(conn: &Connection) -> Result<HashLedger> {
    let mut stmt = conn.prepare("SELECT doc_path, digest FROM ledger")?;
    let ledger: HashLedger = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<_, rusqlite::Error>>()?;
    ledger.validate()?;
    Ok(ledger)
}

fn write_ledger(conn: &Connection, ledger: &HashLedger) -> Result<()> {
    conn.execute("DELETE FROM ledger", [])?;
    let mut stmt = conn.prepare("INSERT INTO ledger (doc_path, digest) VALUES (?1, ?2)")?;
    for (path, digest) in ledger.iter() {
        stmt.execute(params![path, digest])?;
    }
    Ok(())
}

fn read_generation(conn: &Connection) -> Result<Option<GenerationInfo>> {
    let row = conn
        .query_row(
            "SELECT number, dimensions, chunk_count, committed_at FROM generation WHERE id = 1",
            [],
            |row| {
                Ok(GenerationInfo {
                    number: row.get::<_, i64>(0)? as u64,
                    dimensions: row.get::<_, Option<i64>>(1)?.map(|d| d as usize),
                    chunk_count: row.get::<_, i64>(2)? as usize,
                    committed_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn read_entries(conn: &Connection) -> Result<Vec<IndexEntry>> {
    let mut stmt = conn.prepare(
        "SELECT chunk_id, doc_path, doc_digest, position, chunk_text, embedding
         FROM chunks ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    rows.into_iter()
        .map(|(chunk_id, doc_path, doc_digest, position, text, blob)| {
            let embedding = parse_embedding(&blob).ok_or_else(|| {
                RagagentError::Index(format!("Invalid embedding BLOB for chunk {}", chunk_id))
            })?;
            Ok(IndexEntry {
                chunk: Chunk {
                    chunk_id,
                    text,
                    doc_path,
                    doc_digest,
                    position: position as usize,
                },
                embedding,
            })
        })
        .collect()
}

/// f32 vector to little-endian bytes
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Little-endian bytes back to f32s; `None` when the length is not a multiple of 4.
pub fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks_exact(4)
        .map(|bytes| bytes.try_into().ok().map(f32::from_le_bytes))
        .collect()
}
