//! Strategy registry repository

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted strategy row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StrategyRecord {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub kind: String,
    pub trading_mode: Option<String>,
    pub capital_allocation: Option<String>,
    pub paper_capital: Option<String>,
    pub paper_cash: String,
    pub paper_pnl: String,
    pub paper_positions: i64,
    pub max_position_size: String,
    pub max_orders_per_minute: i64,
    pub daily_loss_limit: String,
    /// JSON array of lower-cased wallet addresses
    pub mirror_wallets: String,
    pub mode_switched_at: String,
    pub created_at: String,
}

/// Portfolio baseline written on a mode transition
#[derive(Debug, Clone)]
pub struct PortfolioReset {
    pub paper_cash: String,
    pub paper_pnl: String,
    pub paper_positions: i64,
}

/// Id and name of a strategy touched by a bulk update
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StrategyRef {
    pub id: String,
    pub name: String,
}

/// Repository for the `strategies` table
pub struct StrategyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StrategyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new strategy. The id is supplied by the caller.
    pub async fn insert(&self, record: &StrategyRecord) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO strategies
                (id, name, owner, kind, trading_mode, capital_allocation, paper_capital,
                 paper_cash, paper_pnl, paper_positions, max_position_size,
                 max_orders_per_minute, daily_loss_limit, mirror_wallets,
                 mode_switched_at, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.owner)
        .bind(&record.kind)
        .bind(&record.trading_mode)
        .bind(&record.capital_allocation)
        .bind(&record.paper_capital)
        .bind(&record.paper_cash)
        .bind(&record.paper_pnl)
        .bind(record.paper_positions)
        .bind(&record.max_position_size)
        .bind(record.max_orders_per_minute)
        .bind(&record.daily_loss_limit)
        .bind(&record.mirror_wallets)
        .bind(&record.mode_switched_at)
        .bind(&record.created_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<StrategyRecord>> {
        let record = sqlx::query_as::<_, StrategyRecord>("SELECT * FROM strategies WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// All strategies, oldest first
    pub async fn list(&self) -> DbResult<Vec<StrategyRecord>> {
        let records = sqlx::query_as::<_, StrategyRecord>(
            "SELECT * FROM strategies ORDER BY created_at ASC, name ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    /// Find the strategy already mirroring `wallet` (exact, lower-cased match)
    pub async fn find_by_mirror_wallet(&self, wallet: &str) -> DbResult<Option<StrategyRef>> {
        let record = sqlx::query_as::<_, StrategyRef>(
            r#"SELECT id, name FROM strategies
               WHERE EXISTS (SELECT 1 FROM json_each(strategies.mirror_wallets) WHERE value = ?1)
               LIMIT 1"#,
        )
        .bind(wallet)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Set the trading mode, optionally resetting the portfolio baseline.
    /// Returns false when no strategy has this id.
    pub async fn set_mode(
        &self,
        id: &str,
        mode: &str,
        reset: Option<&PortfolioReset>,
        switched_at: &str,
    ) -> DbResult<bool> {
        let result = match reset {
            Some(reset) => {
                sqlx::query(
                    r#"UPDATE strategies
                       SET trading_mode = ?2, paper_cash = ?3, paper_pnl = ?4,
                           paper_positions = ?5, mode_switched_at = ?6
                       WHERE id = ?1"#,
                )
                .bind(id)
                .bind(mode)
                .bind(&reset.paper_cash)
                .bind(&reset.paper_pnl)
                .bind(reset.paper_positions)
                .bind(switched_at)
                .execute(self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE strategies SET trading_mode = ?2 WHERE id = ?1")
                    .bind(id)
                    .bind(mode)
                    .execute(self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    /// Force every non-paper strategy to paper in one statement, starting a
    /// fresh paper epoch: `paper_pnl` zeroed and `paper_cash` back to the paper
    /// baseline. `paper_positions` is left alone.
    /// Returns the strategies that actually changed.
    pub async fn force_all_paper(
        &self,
        switched_at: &str,
        fallback_cash: &str,
    ) -> DbResult<Vec<StrategyRef>> {
        let changed = sqlx::query_as::<_, StrategyRef>(
            r#"UPDATE strategies
               SET trading_mode = 'paper',
                   mode_switched_at = ?1,
                   paper_pnl = '0',
                   paper_cash = COALESCE(paper_capital, capital_allocation, ?2)
               WHERE trading_mode != 'paper'
               RETURNING id, name"#,
        )
        .bind(switched_at)
        .bind(fallback_cash)
        .fetch_all(self.pool)
        .await?;

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn record(id: &str, name: &str, mode: &str) -> StrategyRecord {
        StrategyRecord {
            id: id.into(),
            name: name.into(),
            owner: None,
            kind: "standard".into(),
            trading_mode: Some(mode.into()),
            capital_allocation: Some("250".into()),
            paper_capital: Some("100".into()),
            paper_cash: "100".into(),
            paper_pnl: "0".into(),
            paper_positions: 0,
            max_position_size: "500".into(),
            max_orders_per_minute: 5,
            daily_loss_limit: "-200".into(),
            mirror_wallets: "[]".into(),
            mode_switched_at: "2026-01-01T00:00:00.000Z".into(),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn test_force_all_paper_returns_changed_rows_only() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());
        repo.insert(&record("a", "Alpha", "live")).await.unwrap();
        repo.insert(&record("b", "Beta", "paper")).await.unwrap();
        repo.insert(&record("c", "Gamma", "live")).await.unwrap();

        let changed = repo.force_all_paper("2026-02-01T00:00:00.000Z", "1000").await.unwrap();
        let mut ids: Vec<_> = changed.into_iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);

        let again = repo.force_all_paper("2026-02-01T00:00:01.000Z", "1000").await.unwrap();
        assert!(again.is_empty());

        let beta = repo.get("b").await.unwrap().unwrap();
        assert_eq!(beta.mode_switched_at, "2026-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_find_by_mirror_wallet() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());
        let mut mirror = record("m", "Whale Mirror - abc", "paper");
        mirror.mirror_wallets = r#"["0xabc"]"#.into();
        repo.insert(&mirror).await.unwrap();

        let found = repo.find_by_mirror_wallet("0xabc").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some("m".to_string()));
        assert!(repo.find_by_mirror_wallet("0xab").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_mode_unknown_id() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());
        let updated = repo
            .set_mode("missing", "live", None, "2026-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(!updated);
    }
}
