//! Generation and entry operations.
//!
//! A generation is a named key-value table of request identity → response.
//! Writes replace the whole entry in one statement, so two racing writers to
//! the same key never produce a mixed row; the later write wins.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheStore;
use super::hash::request_key;
use crate::Error;
use crate::resource::{RequestMode, ResourceRequest, ResourceResponse};

const SELECT_RESPONSE: &str =
    "SELECT status, status_text, headers_json, body FROM entries WHERE generation = ?1 AND key = ?2";

fn read_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u16, String, String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_response((status, status_text, headers_json, body): (u16, String, String, Vec<u8>)) -> Result<ResourceResponse, Error> {
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
    Ok(ResourceResponse { status, status_text, headers, body: Bytes::from(body) })
}

fn lookup(conn: &rusqlite::Connection, generation: &str, key: &str) -> Result<Option<ResourceResponse>, Error> {
    let mut stmt = conn.prepare_cached(SELECT_RESPONSE)?;
    match stmt.query_row(params![generation, key], read_response) {
        Ok(raw) => decode_response(raw).map(Some),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl CacheStore {
    /// Create the generation if absent. Idempotent.
    pub async fn open_generation(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up `request` in one generation.
    ///
    /// Returns None if the generation or the entry doesn't exist.
    pub async fn get(&self, generation: &str, request: &ResourceRequest) -> Result<Option<ResourceResponse>, Error> {
        let generation = generation.to_string();
        let key = request_key(request);
        self.conn
            .call(move |conn| lookup(conn, &generation, &key))
            .await
            .map_err(Error::from)
    }

    /// Store `response` for `request`, creating the generation if needed.
    ///
    /// Overwrites any previous entry for the same request identity. The body
    /// is copied into the database, so the stored bytes are exactly the bytes
    /// passed in regardless of what later happens to the caller's copy.
    pub async fn put(&self, generation: &str, request: &ResourceRequest, response: &ResourceResponse) -> Result<(), Error> {
        let generation = generation.to_string();
        let key = request_key(request);
        let method = request.method.to_ascii_uppercase();
        let url = request.url.to_string();
        let request_headers_json = serde_json::to_string(&request.headers)?;
        let headers_json = serde_json::to_string(&response.headers)?;
        let status = response.status;
        let status_text = response.status_text.clone();
        let body = response.body.to_vec();
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![generation, now],
                )?;
                tx.execute(
                    "INSERT INTO entries (
                        generation, key, method, url, request_headers_json,
                        status, status_text, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(generation, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        request_headers_json = excluded.request_headers_json,
                        status = excluded.status,
                        status_text = excluded.status_text,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        generation,
                        key,
                        method,
                        url,
                        request_headers_json,
                        status,
                        status_text,
                        headers_json,
                        body,
                        now,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Search the current generations, static first, then dynamic.
    pub async fn match_any(&self, request: &ResourceRequest) -> Result<Option<ResourceResponse>, Error> {
        let order: Vec<String> = self.names().lookup_order().iter().map(|s| s.to_string()).collect();
        let key = request_key(request);
        self.conn
            .call(move |conn| -> Result<Option<ResourceResponse>, Error> {
                for generation in &order {
                    if let Some(hit) = lookup(conn, generation, &key)? {
                        return Ok(Some(hit));
                    }
                }
                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every generation in the database, current or not.
    pub async fn list_generation_names(&self) -> Result<BTreeSet<String>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop a generation and all its entries.
    ///
    /// Returns false if no generation had that name.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Requests stored in a generation, in first-stored order.
    pub async fn keys(&self, generation: &str) -> Result<Vec<ResourceRequest>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<ResourceRequest>, Error> {
                let mut stmt = conn
                    .prepare("SELECT method, url, request_headers_json FROM entries WHERE generation = ?1 ORDER BY rowid")?;
                let rows = stmt
                    .query_map(params![generation], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(method, url, headers_json)| -> Result<ResourceRequest, Error> {
                        let url = Url::parse(&url).map_err(|e| Error::CorruptEntry(format!("{url}: {e}")))?;
                        Ok(ResourceRequest { method, url, headers: serde_json::from_str(&headers_json)?, mode: RequestMode::default() })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a generation.
    pub async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![generation], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
