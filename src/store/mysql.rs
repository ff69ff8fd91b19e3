//! MySQL-backed `FingerprintStore` + `MetadataStore` (§4.3, §4.4) — the
//! historical second relational variant (§9). Same schema and contract as
//! [`super::postgres`], but MySQL has no `ON CONFLICT`, so duplicate
//! postings are suppressed with `INSERT IGNORE` and the hash join uses a
//! driver-created temporary table rather than a `CREATE TEMPORARY TABLE`
//! inside a transaction (MySQL's temp tables are connection-scoped, not
//! transaction-scoped).

use super::schema::{postings, reference_catalog, reference_metadata};
use super::{FingerprintStore, MetadataStore};
use crate::error::{Result, SabiError};
use crate::model::{ContentDigest, Hash80, MetadataRecord, ReferenceId, ReferenceRow};
use chrono::{NaiveDateTime, Utc};
use diesel::mysql::MysqlConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer};

pub struct MySqlStore {
    conn: MysqlConnection,
}

impl MySqlStore {
    pub fn connect(database_url: &str) -> Result<Self> {
        let conn =
            MysqlConnection::establish(database_url).map_err(|e| SabiError::StoreUnavailable {
                reason: e.to_string(),
            })?;
        Ok(Self { conn })
    }

    fn map_diesel(context: &str, err: diesel::result::Error) -> SabiError {
        match err {
            diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, info) => {
                SabiError::StoreConflict {
                    context: context.to_string(),
                    reason: info.message().to_string(),
                }
            }
            other => SabiError::StoreUnavailable {
                reason: format!("{context}: {other}"),
            },
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = reference_catalog)]
struct ReferenceCatalogRow {
    reference_id: i32,
    name: String,
    fingerprinted: bool,
    content_digest: Vec<u8>,
}

#[derive(Insertable)]
#[diesel(table_name = reference_catalog)]
struct NewReference<'a> {
    name: &'a str,
    fingerprinted: bool,
    content_digest: Vec<u8>,
}

#[derive(QueryableByName)]
struct MatchRow {
    #[diesel(sql_type = BigInt)]
    hash: i64,
    #[diesel(sql_type = Integer)]
    reference_id: i32,
    #[diesel(sql_type = Integer)]
    time_offset: i32,
}

impl FingerprintStore for MySqlStore {
    fn empty(&mut self) -> Result<()> {
        diesel::delete(postings::table)
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("empty.postings", e))?;
        diesel::delete(reference_catalog::table)
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("empty.references", e))?;
        Ok(())
    }

    fn insert_reference(
        &mut self,
        name: &str,
        content_digest: ContentDigest,
    ) -> Result<ReferenceId> {
        if reference_catalog::table
            .filter(reference_catalog::name.eq(name))
            .select(reference_catalog::reference_id)
            .first::<i32>(&mut self.conn)
            .optional()
            .map_err(|e| Self::map_diesel("insert_reference.check", e))?
            .is_some()
        {
            return Err(SabiError::DuplicateReference {
                name: name.to_string(),
            });
        }

        diesel::insert_into(reference_catalog::table)
            .values(&NewReference {
                name,
                fingerprinted: false,
                content_digest: content_digest.0.to_vec(),
            })
            .execute(&mut self.conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => SabiError::DuplicateReference {
                    name: name.to_string(),
                },
                other => Self::map_diesel("insert_reference", other),
            })?;

        let row: ReferenceCatalogRow = reference_catalog::table
            .filter(reference_catalog::name.eq(name))
            .select(ReferenceCatalogRow::as_select())
            .first(&mut self.conn)
            .map_err(|e| Self::map_diesel("insert_reference.reread", e))?;
        Ok(ReferenceId(row.reference_id))
    }

    fn set_fingerprinted(&mut self, reference_id: ReferenceId) -> Result<()> {
        diesel::update(reference_catalog::table.find(reference_id.0))
            .set(reference_catalog::fingerprinted.eq(true))
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("set_fingerprinted", e))?;
        Ok(())
    }

    fn insert_posting(
        &mut self,
        hash: &Hash80,
        reference_id: ReferenceId,
        time_offset: u32,
    ) -> Result<()> {
        self.insert_postings_batch(reference_id, &[(hash.clone(), time_offset)])?;
        Ok(())
    }

    fn insert_postings_batch(
        &mut self,
        reference_id: ReferenceId,
        batch: &[(Hash80, u32)],
    ) -> Result<usize> {
        const CHUNK: usize = 1_000;
        let mut total = 0usize;
        self.conn
            .transaction(|conn| {
                for chunk in batch.chunks(CHUNK) {
                    if chunk.is_empty() {
                        continue;
                    }
                    let mut query = String::from(
                        "INSERT IGNORE INTO postings (hash, reference_id, time_offset) VALUES ",
                    );
                    let values: Vec<String> = chunk
                        .iter()
                        .map(|(hash, offset)| {
                            format!("({}, {}, {})", hash.to_i64(), reference_id.0, offset)
                        })
                        .collect();
                    query.push_str(&values.join(", "));
                    let n = diesel::sql_query(query).execute(conn)?;
                    total += n;
                }
                Ok::<_, diesel::result::Error>(())
            })
            .map_err(|e| Self::map_diesel("insert_postings_batch", e))?;
        Ok(total)
    }

    fn delete_reference(&mut self, reference_id: ReferenceId) -> Result<()> {
        diesel::delete(postings::table.filter(postings::reference_id.eq(reference_id.0)))
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("delete_reference.postings", e))?;
        diesel::delete(reference_catalog::table.find(reference_id.0))
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("delete_reference", e))?;
        Ok(())
    }

    fn list_references(&mut self) -> Result<Vec<ReferenceRow>> {
        let rows: Vec<ReferenceCatalogRow> = reference_catalog::table
            .filter(reference_catalog::fingerprinted.eq(true))
            .select(ReferenceCatalogRow::as_select())
            .load(&mut self.conn)
            .map_err(|e| Self::map_diesel("list_references", e))?;
        Ok(rows
            .into_iter()
            .map(|r| ReferenceRow {
                reference_id: ReferenceId(r.reference_id),
                name: r.name,
                content_digest: {
                    let mut buf = [0u8; 20];
                    let n = r.content_digest.len().min(20);
                    buf[..n].copy_from_slice(&r.content_digest[..n]);
                    ContentDigest(buf)
                },
            })
            .collect())
    }

    fn count_references(&mut self) -> Result<u64> {
        let n: i64 = reference_catalog::table
            .count()
            .get_result(&mut self.conn)
            .map_err(|e| Self::map_diesel("count_references", e))?;
        Ok(n as u64)
    }

    fn count_postings(&mut self) -> Result<u64> {
        let n: i64 = postings::table
            .count()
            .get_result(&mut self.conn)
            .map_err(|e| Self::map_diesel("count_postings", e))?;
        Ok(n as u64)
    }

    fn return_matches(
        &mut self,
        query_hashes: &[(Hash80, u32)],
    ) -> Result<Vec<(ReferenceId, i64)>> {
        if query_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let offsets: std::collections::HashMap<i64, Vec<u32>> =
            query_hashes.iter().fold(Default::default(), |mut map, (h, off)| {
                map.entry(h.to_i64()).or_insert_with(Vec::new).push(*off);
                map
            });
        let hash_values: Vec<i64> = offsets.keys().copied().collect();

        diesel::sql_query(
            "CREATE TEMPORARY TABLE IF NOT EXISTS temp_query_hashes (hash BIGINT NOT NULL PRIMARY KEY)",
        )
        .execute(&mut self.conn)
        .map_err(|e| Self::map_diesel("return_matches.create_temp", e))?;
        diesel::sql_query("DELETE FROM temp_query_hashes")
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("return_matches.clear_temp", e))?;

        const CHUNK: usize = 1_000;
        for chunk in hash_values.chunks(CHUNK) {
            if chunk.is_empty() {
                continue;
            }
            let values: Vec<String> = chunk.iter().map(|h| format!("({h})")).collect();
            let query = format!(
                "INSERT IGNORE INTO temp_query_hashes (hash) VALUES {}",
                values.join(", ")
            );
            diesel::sql_query(query)
                .execute(&mut self.conn)
                .map_err(|e| Self::map_diesel("return_matches.fill_temp", e))?;
        }

        let rows: Vec<MatchRow> = diesel::sql_query(
            "SELECT p.hash, p.reference_id, p.time_offset FROM postings AS p \
             INNER JOIN temp_query_hashes AS t ON p.hash = t.hash",
        )
        .load(&mut self.conn)
        .map_err(|e| Self::map_diesel("return_matches.join", e))?;

        diesel::sql_query("DROP TEMPORARY TABLE IF EXISTS temp_query_hashes")
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("return_matches.drop_temp", e))?;

        let mut out = Vec::new();
        for row in rows {
            if let Some(query_offsets) = offsets.get(&row.hash) {
                for &query_offset in query_offsets {
                    let diff = row.time_offset as i64 - query_offset as i64;
                    out.push((ReferenceId(row.reference_id), diff));
                }
            }
        }
        Ok(out)
    }

    fn cleanup_unfingerprinted(&mut self) -> Result<u64> {
        let orphans: Vec<i32> = reference_catalog::table
            .filter(reference_catalog::fingerprinted.eq(false))
            .select(reference_catalog::reference_id)
            .load(&mut self.conn)
            .map_err(|e| Self::map_diesel("cleanup_unfingerprinted.select", e))?;
        for id in &orphans {
            self.delete_reference(ReferenceId(*id))?;
        }
        Ok(orphans.len() as u64)
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = reference_metadata)]
struct MetadataRow {
    name: String,
    metadata: String,
    source_file: Option<String>,
    date_added: Option<NaiveDateTime>,
    debounce_seconds: Option<f64>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = reference_metadata)]
struct NewMetadataRow<'a> {
    name: &'a str,
    metadata: String,
    source_file: Option<&'a str>,
    date_added: Option<NaiveDateTime>,
    debounce_seconds: Option<f64>,
}

fn row_to_record(row: MetadataRow) -> Result<MetadataRecord> {
    let doc: serde_json::Value =
        serde_json::from_str(&row.metadata).map_err(|e| SabiError::Json {
            context: row.name.clone(),
            source: e,
        })?;
    Ok(MetadataRecord {
        name: row.name,
        doc,
        source_file: row.source_file,
        date_added: row.date_added.map(|d| d.and_utc()),
        debounce_seconds: row.debounce_seconds,
    })
}

impl MetadataStore for MySqlStore {
    fn upsert_metadata(&mut self, record: MetadataRecord) -> Result<()> {
        let metadata_json = serde_json::to_string(&record.doc).map_err(|e| SabiError::Json {
            context: record.name.clone(),
            source: e,
        })?;
        let new_row = NewMetadataRow {
            name: &record.name,
            metadata: metadata_json,
            source_file: record.source_file.as_deref(),
            date_added: record.date_added.map(|d| d.naive_utc()).or_else(|| Some(Utc::now().naive_utc())),
            debounce_seconds: record.debounce_seconds,
        };
        // MySQL's diesel backend has no native upsert DSL; replace via
        // delete-then-insert inside one transaction keeps this atomic.
        self.conn
            .transaction(|conn| {
                diesel::delete(reference_metadata::table.find(&record.name)).execute(conn)?;
                diesel::insert_into(reference_metadata::table)
                    .values(&new_row)
                    .execute(conn)
            })
            .map_err(|e| Self::map_diesel("upsert_metadata", e))?;
        Ok(())
    }

    fn get_metadata(&mut self, name: &str) -> Result<Option<MetadataRecord>> {
        let row: Option<MetadataRow> = reference_metadata::table
            .find(name)
            .select(MetadataRow::as_select())
            .first(&mut self.conn)
            .optional()
            .map_err(|e| Self::map_diesel("get_metadata", e))?;
        row.map(row_to_record).transpose()
    }

    fn delete_metadata(&mut self, name: &str) -> Result<()> {
        diesel::delete(reference_metadata::table.find(name))
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("delete_metadata", e))?;
        Ok(())
    }

    fn list_metadata(&mut self) -> Result<Vec<MetadataRecord>> {
        let rows: Vec<MetadataRow> = reference_metadata::table
            .select(MetadataRow::as_select())
            .load(&mut self.conn)
            .map_err(|e| Self::map_diesel("list_metadata", e))?;
        rows.into_iter().map(row_to_record).collect()
    }

    fn clear_metadata(&mut self) -> Result<()> {
        diesel::delete(reference_metadata::table)
            .execute(&mut self.conn)
            .map_err(|e| Self::map_diesel("clear_metadata", e))?;
        Ok(())
    }

    fn count_metadata(&mut self) -> Result<u64> {
        let n: i64 = reference_metadata::table
            .count()
            .get_result(&mut self.conn)
            .map_err(|e| Self::map_diesel("count_metadata", e))?;
        Ok(n as u64)
    }

    fn query_by_field(
        &mut self,
        path: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<MetadataRecord>> {
        let all = self.list_metadata()?;
        Ok(all
            .into_iter()
            .filter(|m| m.value_at_path(path) == Some(value))
            .collect())
    }
}
