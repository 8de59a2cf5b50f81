use super::store::{LedgerStore, StoreError};
use super::{AdminState, Address, CredentialHash, CredentialRecord, RegistryCounters};
use crate::credentials::CredentialType;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type Db = Pool<Sqlite>;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// SQLite-backed ledger. Batch inserts run in one transaction.
#[derive(Clone)]
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    /// Connect (creating the file if needed) and ensure the schema exists.
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(backend)?
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS registry_admin (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  owner TEXT NOT NULL,
  paused INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS verifiers (
  address TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS credentials (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  credential_hash TEXT NOT NULL UNIQUE,
  owner TEXT NOT NULL,
  credential_type TEXT NOT NULL,
  issued_at INTEGER NOT NULL,
  expires_at INTEGER NOT NULL,
  is_revoked INTEGER NOT NULL,
  ipfs_hash TEXT NOT NULL,
  score INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS credentials_by_owner ON credentials (owner);
CREATE INDEX IF NOT EXISTS credentials_by_type ON credentials (credential_type);
"#,
        )
        .execute(&self.db)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn hashes_where(&self, column: &'static str, value: &str) -> Result<Vec<CredentialHash>, StoreError> {
        let sql = format!("SELECT credential_hash FROM credentials WHERE {column} = ? ORDER BY seq");
        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.db).await.map_err(backend)?;

        rows.iter()
            .map(|row| {
                let h: String = row.get(0);
                h.parse::<CredentialHash>().map_err(StoreError::Corrupt)
            })
            .collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<CredentialRecord, StoreError> {
    let hash: String = row.get("credential_hash");
    let owner: String = row.get("owner");
    let credential_type: String = row.get("credential_type");
    let is_revoked: i64 = row.get("is_revoked");
    let score: i64 = row.get("score");

    Ok(CredentialRecord {
        owner: Address::new(owner),
        credential_type: credential_type.parse().map_err(StoreError::Corrupt)?,
        credential_hash: hash.parse().map_err(StoreError::Corrupt)?,
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        is_revoked: is_revoked == 1,
        ipfs_hash: row.get("ipfs_hash"),
        score: u64::try_from(score).map_err(|_| StoreError::Corrupt(format!("negative score {score}")))?,
    })
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn load_admin(&self) -> Result<Option<AdminState>, StoreError> {
        let row = sqlx::query(r#"SELECT owner, paused FROM registry_admin WHERE id = 1"#)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)?;

        let Some(row) = row else { return Ok(None); };
        let owner: String = row.get(0);
        let paused: i64 = row.get(1);
        Ok(Some(AdminState { owner: Address::new(owner), paused: paused == 1 }))
    }

    async fn save_admin(&self, admin: &AdminState) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO registry_admin (id, owner, paused) VALUES (1, ?, ?)
               ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, paused = excluded.paused"#,
        )
        .bind(admin.owner.as_str())
        .bind(if admin.paused { 1i64 } else { 0i64 })
        .execute(&self.db)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn set_verifier(&self, verifier: &Address, authorized: bool) -> Result<(), StoreError> {
        let sql = if authorized {
            r#"INSERT OR IGNORE INTO verifiers (address) VALUES (?)"#
        } else {
            r#"DELETE FROM verifiers WHERE address = ?"#
        };
        sqlx::query(sql)
            .bind(verifier.as_str())
            .execute(&self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn is_verifier(&self, address: &Address) -> Result<bool, StoreError> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS c FROM verifiers WHERE address = ?"#)
            .bind(address.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(backend)?;
        let c: i64 = row.get("c");
        Ok(c > 0)
    }

    async fn insert_credentials(&self, records: &[CredentialRecord]) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await.map_err(backend)?;

        for r in records {
            let score = i64::try_from(r.score)
                .map_err(|_| StoreError::Unrepresentable { field: "score", value: r.score })?;
            let res = sqlx::query(
                r#"INSERT INTO credentials
                   (credential_hash, owner, credential_type, issued_at, expires_at, is_revoked, ipfs_hash, score)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(r.credential_hash.to_string())
            .bind(r.owner.as_str())
            .bind(r.credential_type.as_str())
            .bind(r.issued_at)
            .bind(r.expires_at)
            .bind(if r.is_revoked { 1i64 } else { 0i64 })
            .bind(&r.ipfs_hash)
            .bind(score)
            .execute(&mut *tx)
            .await;

            match res {
                Ok(_) => {}
                // Dropping `tx` rolls back the whole batch.
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    return Err(StoreError::Duplicate(r.credential_hash));
                }
                Err(e) => return Err(backend(e)),
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn get_credential(&self, hash: &CredentialHash) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query(
            r#"SELECT credential_hash, owner, credential_type, issued_at, expires_at, is_revoked, ipfs_hash, score
               FROM credentials WHERE credential_hash = ?"#,
        )
        .bind(hash.to_string())
        .fetch_optional(&self.db)
        .await
        .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn mark_revoked(&self, hash: &CredentialHash) -> Result<(), StoreError> {
        let res = sqlx::query(r#"UPDATE credentials SET is_revoked = 1 WHERE credential_hash = ?"#)
            .bind(hash.to_string())
            .execute(&self.db)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Missing(*hash));
        }
        Ok(())
    }

    async fn set_ipfs_hash(&self, hash: &CredentialHash, ipfs_hash: &str) -> Result<(), StoreError> {
        let res = sqlx::query(r#"UPDATE credentials SET ipfs_hash = ? WHERE credential_hash = ?"#)
            .bind(ipfs_hash)
            .bind(hash.to_string())
            .execute(&self.db)
            .await
            .map_err(backend)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Missing(*hash));
        }
        Ok(())
    }

    async fn credentials_by_owner(&self, owner: &Address) -> Result<Vec<CredentialHash>, StoreError> {
        self.hashes_where("owner", owner.as_str()).await
    }

    async fn credentials_by_type(&self, credential_type: CredentialType) -> Result<Vec<CredentialHash>, StoreError> {
        self.hashes_where("credential_type", credential_type.as_str()).await
    }

    async fn counters(&self) -> Result<RegistryCounters, StoreError> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS total, COALESCE(SUM(is_revoked), 0) AS revoked FROM credentials"#,
        )
        .fetch_one(&self.db)
        .await
        .map_err(backend)?;

        let total: i64 = row.get("total");
        let revoked: i64 = row.get("revoked");
        Ok(RegistryCounters { total_credentials: total as u64, total_revoked: revoked as u64 })
    }
}
