use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::ProgressError;
use crate::models::{
    ConsumptionEntry, DailyBalance, EntryStatus, Food, NewConsumptionEntry, NewFood,
    ProteinTarget, StreakState,
};

const ENTRY_COLUMNS: &str = "id, uuid, eaten_at, quantity_g, protein_g, food_id, label, status, created_at, updated_at";
const FOOD_COLUMNS: &str =
    "id, uuid, name, protein_per_100g, default_serving_g, created_at, updated_at";
const BALANCE_COLUMNS: &str =
    "date, target_protein, consumed_protein, rollover_balance, adjusted_target";

impl ToSql for EntryStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn
                .execute_batch(
                    "CREATE TABLE IF NOT EXISTS foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    protein_per_100g REAL NOT NULL,
                    default_serving_g REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS consumption_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    date TEXT NOT NULL,
                    eaten_at TEXT NOT NULL,
                    quantity_g REAL NOT NULL,
                    protein_g REAL NOT NULL,
                    food_id INTEGER REFERENCES foods(id),
                    label TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('planned', 'done', 'skipped')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_consumption_entries_date ON consumption_entries(date);

                CREATE TABLE IF NOT EXISTS targets (
                    day_of_week INTEGER PRIMARY KEY CHECK (day_of_week BETWEEN 0 AND 6),
                    protein_g REAL NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS daily_balances (
                    date TEXT PRIMARY KEY NOT NULL,
                    target_protein REAL NOT NULL,
                    consumed_protein REAL NOT NULL,
                    rollover_balance REAL NOT NULL,
                    adjusted_target REAL NOT NULL,
                    evaluated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS streak_state (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    current_streak INTEGER NOT NULL DEFAULT 0,
                    best_streak INTEGER NOT NULL DEFAULT 0,
                    last_success_date TEXT,
                    total_days_with_goal INTEGER NOT NULL DEFAULT 0,
                    streak_saver_used_this_week INTEGER NOT NULL DEFAULT 0,
                    week_start_date TEXT,
                    this_week_target_hits INTEGER NOT NULL DEFAULT 0,
                    this_week_total_days INTEGER NOT NULL DEFAULT 0,
                    unlocked_badges TEXT NOT NULL DEFAULT '[]',
                    daily_achievements TEXT NOT NULL DEFAULT '[]',
                    achievements_date TEXT,
                    last_evaluated_date TEXT,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
                )
                .context("Failed to apply schema")?;
            info!("database schema initialised");
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn food_from_row(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        Ok(Food {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            protein_per_100g: row.get(3)?,
            default_serving_g: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<ConsumptionEntry> {
        Ok(ConsumptionEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            eaten_at: row.get(2)?,
            quantity_g: row.get(3)?,
            protein_g: row.get(4)?,
            food_id: row.get(5)?,
            label: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn balance_from_row(row: &rusqlite::Row) -> rusqlite::Result<DailyBalance> {
        Ok(DailyBalance {
            date: row.get(0)?,
            target_protein: row.get(1)?,
            consumed_protein: row.get(2)?,
            rollover_balance: row.get(3)?,
            adjusted_target: row.get(4)?,
        })
    }

    // --- Foods ---

    pub fn insert_food(&self, food: &NewFood) -> Result<Food> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO foods (uuid, name, protein_per_100g, default_serving_g, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    uuid,
                    food.name.trim(),
                    food.protein_per_100g,
                    food.default_serving_g,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("Failed to add food '{}'", food.name.trim()))?;
        let id = self.conn.last_insert_rowid();
        self.get_food_by_id(id)
    }

    pub fn get_food_by_id(&self, id: i64) -> Result<Food> {
        self.conn
            .query_row(
                &format!("SELECT {FOOD_COLUMNS} FROM foods WHERE id = ?1"),
                params![id],
                Self::food_from_row,
            )
            .context("Food not found")
    }

    /// Case-insensitive exact match on the food name.
    pub fn find_food_by_name(&self, name: &str) -> Result<Option<Food>> {
        let food = self
            .conn
            .query_row(
                &format!("SELECT {FOOD_COLUMNS} FROM foods WHERE name = ?1"),
                params![name.trim()],
                Self::food_from_row,
            )
            .optional()?;
        Ok(food)
    }

    pub fn search_foods(&self, query: &str) -> Result<Vec<Food>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT 20"
        ))?;
        let foods = stmt
            .query_map(params![pattern], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    pub fn list_foods(&self, search: Option<&str>) -> Result<Vec<Food>> {
        if let Some(query) = search {
            return self.search_foods(query);
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods ORDER BY name LIMIT 100"
        ))?;
        let foods = stmt
            .query_map([], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    // --- Consumption entries ---

    pub fn insert_entry(&self, entry: &NewConsumptionEntry) -> Result<ConsumptionEntry> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO consumption_entries
                (uuid, date, eaten_at, quantity_g, protein_g, food_id, label, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uuid,
                entry.eaten_at.date(),
                entry.eaten_at,
                entry.quantity_g,
                entry.protein_g,
                entry.food_id,
                entry.label.trim(),
                entry.status,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_entry(id)
    }

    pub fn get_entry(&self, id: i64) -> Result<ConsumptionEntry> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM consumption_entries WHERE id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .context("Entry not found")
    }

    pub fn find_entry(&self, id: i64) -> Result<Option<ConsumptionEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM consumption_entries WHERE id = ?1"),
                params![id],
                Self::entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn delete_entry(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM consumption_entries WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn set_entry_status(&self, id: i64, status: EntryStatus) -> Result<ConsumptionEntry> {
        // Verify existence
        self.get_entry(id)?;

        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE consumption_entries SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now, id],
        )?;
        self.get_entry(id)
    }

    /// All entries eaten on `date`, in eating order.
    pub fn get_entries_for_date(&self, date: NaiveDate) -> Result<Vec<ConsumptionEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM consumption_entries
             WHERE date = ?1
             ORDER BY eaten_at, id"
        ))?;
        let entries = stmt
            .query_map(params![date], Self::entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Whether any done entry exists on a day before `date`.
    pub fn has_consumed_before(&self, date: NaiveDate) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM consumption_entries WHERE date < ?1 AND status = ?2
             )",
            params![date, EntryStatus::Done],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // --- Targets ---

    pub fn set_target(&self, day_of_week: i64, protein_g: f64) -> Result<ProteinTarget> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO targets (day_of_week, protein_g, updated_at)
             VALUES (?1, ?2, ?3)",
            params![day_of_week, protein_g, now],
        )?;
        Ok(ProteinTarget {
            day_of_week,
            protein_g,
        })
    }

    pub fn get_target(&self, day_of_week: i64) -> Result<Option<ProteinTarget>> {
        let target = self
            .conn
            .query_row(
                "SELECT day_of_week, protein_g FROM targets WHERE day_of_week = ?1",
                params![day_of_week],
                |row| {
                    Ok(ProteinTarget {
                        day_of_week: row.get(0)?,
                        protein_g: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(target)
    }

    pub fn get_all_targets(&self) -> Result<Vec<ProteinTarget>> {
        let mut stmt = self
            .conn
            .prepare("SELECT day_of_week, protein_g FROM targets ORDER BY day_of_week")?;
        let targets = stmt
            .query_map([], |row| {
                Ok(ProteinTarget {
                    day_of_week: row.get(0)?,
                    protein_g: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    pub fn clear_target(&self, day_of_week: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM targets WHERE day_of_week = ?1",
            params![day_of_week],
        )?;
        Ok(rows > 0)
    }

    pub fn clear_all_targets(&self) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM targets", [])?;
        Ok(rows > 0)
    }

    /// Protein target for `date`: the weekday's row, else `default_g`.
    pub fn target_for_date(&self, date: NaiveDate, default_g: f64) -> Result<f64> {
        let day_of_week = i64::from(date.weekday().num_days_from_monday());
        Ok(self
            .get_target(day_of_week)?
            .map_or(default_g, |t| t.protein_g))
    }

    // --- Daily balances ---

    pub fn get_balance(&self, date: NaiveDate) -> Result<Option<DailyBalance>> {
        let balance = self
            .conn
            .query_row(
                &format!("SELECT {BALANCE_COLUMNS} FROM daily_balances WHERE date = ?1"),
                params![date],
                Self::balance_from_row,
            )
            .optional()?;
        Ok(balance)
    }

    /// Most recent closed day strictly before `date`.
    pub fn get_previous_balance(&self, date: NaiveDate) -> Result<Option<DailyBalance>> {
        let balance = self
            .conn
            .query_row(
                &format!(
                    "SELECT {BALANCE_COLUMNS} FROM daily_balances
                     WHERE date < ?1 ORDER BY date DESC LIMIT 1"
                ),
                params![date],
                Self::balance_from_row,
            )
            .optional()?;
        Ok(balance)
    }

    /// Closed days in `[from, to]`, oldest first.
    pub fn get_balances_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyBalance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BALANCE_COLUMNS} FROM daily_balances
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date"
        ))?;
        let balances = stmt
            .query_map(params![from, to], Self::balance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(balances)
    }

    // --- Streak state ---

    /// The stored progression state, or a fresh one if nothing was saved yet.
    ///
    /// Badge and achievement sets that fail to decode load as empty.
    pub fn load_streak_state(&self) -> Result<StreakState> {
        let row = self
            .conn
            .query_row(
                "SELECT current_streak, best_streak, last_success_date, total_days_with_goal,
                        streak_saver_used_this_week, week_start_date, this_week_target_hits,
                        this_week_total_days, unlocked_badges, daily_achievements,
                        achievements_date, last_evaluated_date
                 FROM streak_state WHERE id = 1",
                [],
                |row| {
                    let badges: String = row.get(8)?;
                    let achievements: String = row.get(9)?;
                    let state = StreakState {
                        current_streak: row.get(0)?,
                        best_streak: row.get(1)?,
                        last_success_date: row.get(2)?,
                        total_days_with_goal: row.get(3)?,
                        streak_saver_used_this_week: row.get(4)?,
                        week_start_date: row.get(5)?,
                        this_week_target_hits: row.get(6)?,
                        this_week_total_days: row.get(7)?,
                        unlocked_badges: BTreeSet::new(),
                        daily_achievements: BTreeSet::new(),
                        achievements_date: row.get(10)?,
                        last_evaluated_date: row.get(11)?,
                    };
                    Ok((state, badges, achievements))
                },
            )
            .optional()
            .context("Failed to load streak state")?;

        let Some((mut state, badges, achievements)) = row else {
            return Ok(StreakState::default());
        };
        state.unlocked_badges = decode_set("unlocked_badges", &badges);
        state.daily_achievements = decode_set("daily_achievements", &achievements);
        Ok(state)
    }

    /// Persist the state on its own, e.g. after a same-day achievement check.
    pub fn save_streak_state(&self, state: &StreakState) -> Result<()> {
        write_streak_state(&self.conn, state).context("Failed to save streak state")
    }

    /// Run `f` in one transaction. An error from `f` rolls back every write it made.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Store a closed day's balance together with the resulting streak state.
    ///
    /// Both writes land or neither does. A balance already stored for the
    /// same date makes the commit fail.
    pub fn commit_day(
        &self,
        balance: &DailyBalance,
        state: &StreakState,
    ) -> Result<(), ProgressError> {
        let commit = || -> rusqlite::Result<()> {
            let tx = self.conn.unchecked_transaction()?;
            write_streak_state(&tx, state)?;
            insert_balance(&tx, balance)?;
            tx.commit()
        };
        commit().map_err(|e| {
            warn!(date = %balance.date, "day commit rolled back: {e}");
            ProgressError::CommitFailed(e)
        })?;
        info!(date = %balance.date, streak = state.current_streak, "day committed");
        Ok(())
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    pub fn load_engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::from_settings(|key| self.get_setting(key))
    }
}

fn write_streak_state(conn: &Connection, state: &StreakState) -> rusqlite::Result<()> {
    let now = Local::now().to_rfc3339();
    conn.execute(
        "INSERT INTO streak_state (
            id, current_streak, best_streak, last_success_date, total_days_with_goal,
            streak_saver_used_this_week, week_start_date, this_week_target_hits,
            this_week_total_days, unlocked_badges, daily_achievements,
            achievements_date, last_evaluated_date, updated_at
         ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            current_streak = excluded.current_streak,
            best_streak = excluded.best_streak,
            last_success_date = excluded.last_success_date,
            total_days_with_goal = excluded.total_days_with_goal,
            streak_saver_used_this_week = excluded.streak_saver_used_this_week,
            week_start_date = excluded.week_start_date,
            this_week_target_hits = excluded.this_week_target_hits,
            this_week_total_days = excluded.this_week_total_days,
            unlocked_badges = excluded.unlocked_badges,
            daily_achievements = excluded.daily_achievements,
            achievements_date = excluded.achievements_date,
            last_evaluated_date = excluded.last_evaluated_date,
            updated_at = excluded.updated_at",
        params![
            state.current_streak,
            state.best_streak,
            state.last_success_date,
            state.total_days_with_goal,
            state.streak_saver_used_this_week,
            state.week_start_date,
            state.this_week_target_hits,
            state.this_week_total_days,
            encode_set(&state.unlocked_badges)?,
            encode_set(&state.daily_achievements)?,
            state.achievements_date,
            state.last_evaluated_date,
            now,
        ],
    )?;
    Ok(())
}

fn insert_balance(conn: &Connection, balance: &DailyBalance) -> rusqlite::Result<()> {
    let now = Local::now().to_rfc3339();
    conn.execute(
        "INSERT INTO daily_balances
            (date, target_protein, consumed_protein, rollover_balance, adjusted_target, evaluated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            balance.date,
            balance.target_protein,
            balance.consumed_protein,
            balance.rollover_balance,
            balance.adjusted_target,
            now,
        ],
    )?;
    Ok(())
}

fn encode_set<T: Serialize>(set: &BTreeSet<T>) -> rusqlite::Result<String> {
    serde_json::to_string(set).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn decode_set<T: DeserializeOwned + Ord>(column: &str, raw: &str) -> BTreeSet<T> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(column, raw, "discarding unreadable stored set: {e}");
        BTreeSet::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Badge, DailyAchievement};
    use chrono::NaiveDateTime;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn at(d: u32, hour: u32) -> NaiveDateTime {
        date(d).and_hms_opt(hour, 0, 0).unwrap()
    }

    fn sample_food() -> NewFood {
        NewFood {
            name: "Chicken Breast".to_string(),
            protein_per_100g: 31.0,
            default_serving_g: Some(150.0),
        }
    }

    fn new_entry(eaten_at: NaiveDateTime, protein_g: f64, status: EntryStatus) -> NewConsumptionEntry {
        NewConsumptionEntry {
            eaten_at,
            quantity_g: 100.0,
            protein_g,
            food_id: None,
            label: "Shake".to_string(),
            status,
        }
    }

    fn balance(d: u32, rollover: f64) -> DailyBalance {
        DailyBalance {
            date: date(d),
            target_protein: 120.0,
            consumed_protein: 120.0 + rollover,
            rollover_balance: rollover,
            adjusted_target: 120.0 - 0.3 * rollover,
        }
    }

    #[test]
    fn test_insert_and_get_food() {
        let db = Database::open_in_memory().unwrap();
        let food = db.insert_food(&sample_food()).unwrap();

        assert_eq!(food.name, "Chicken Breast");
        assert!(!food.uuid.is_empty());
        assert!((food.protein_per_100g - 31.0).abs() < f64::EPSILON);
        assert!((food.protein_for(200.0) - 62.0).abs() < 1e-9);

        let fetched = db.get_food_by_id(food.id).unwrap();
        assert_eq!(fetched.name, "Chicken Breast");
        assert!(db.get_food_by_id(999).is_err());
    }

    #[test]
    fn test_food_names_are_unique_ignoring_case() {
        let db = Database::open_in_memory().unwrap();
        db.insert_food(&sample_food()).unwrap();
        let dup = NewFood {
            name: "chicken breast".to_string(),
            ..sample_food()
        };
        assert!(db.insert_food(&dup).is_err());

        let found = db.find_food_by_name("CHICKEN BREAST").unwrap().unwrap();
        assert_eq!(found.name, "Chicken Breast");
        assert!(db.find_food_by_name("Tofu").unwrap().is_none());
    }

    #[test]
    fn test_list_and_search_foods() {
        let db = Database::open_in_memory().unwrap();
        db.insert_food(&sample_food()).unwrap();
        db.insert_food(&NewFood {
            name: "Greek Yogurt".to_string(),
            protein_per_100g: 10.0,
            default_serving_g: None,
        })
        .unwrap();

        assert_eq!(db.list_foods(None).unwrap().len(), 2);
        let filtered = db.list_foods(Some("yog")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Greek Yogurt");
        assert!(db.search_foods("100%").unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_get_entry() {
        let db = Database::open_in_memory().unwrap();
        let food = db.insert_food(&sample_food()).unwrap();
        let entry = db
            .insert_entry(&NewConsumptionEntry {
                eaten_at: at(15, 12),
                quantity_g: 200.0,
                protein_g: 62.0,
                food_id: Some(food.id),
                label: "Chicken Breast".to_string(),
                status: EntryStatus::Done,
            })
            .unwrap();

        assert_eq!(entry.food_id, Some(food.id));
        assert_eq!(entry.status, EntryStatus::Done);
        assert_eq!(entry.eaten_at, at(15, 12));
        assert_eq!(entry.date(), date(15));
        assert!(!entry.uuid.is_empty());
    }

    #[test]
    fn test_entries_for_date_in_eating_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_entry(&new_entry(at(15, 18), 30.0, EntryStatus::Done))
            .unwrap();
        db.insert_entry(&new_entry(at(15, 7), 20.0, EntryStatus::Planned))
            .unwrap();
        db.insert_entry(&new_entry(at(16, 9), 10.0, EntryStatus::Done))
            .unwrap();

        let entries = db.get_entries_for_date(date(15)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].eaten_at, at(15, 7));
        assert_eq!(entries[1].eaten_at, at(15, 18));
        assert!(db.get_entries_for_date(date(17)).unwrap().is_empty());
    }

    #[test]
    fn test_set_entry_status_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_entry(&new_entry(at(15, 8), 25.0, EntryStatus::Planned))
            .unwrap();

        let done = db.set_entry_status(entry.id, EntryStatus::Done).unwrap();
        assert_eq!(done.status, EntryStatus::Done);
        assert!(db.set_entry_status(999, EntryStatus::Done).is_err());

        assert!(db.delete_entry(entry.id).unwrap());
        // Deleting again should return false
        assert!(!db.delete_entry(entry.id).unwrap());
        assert!(db.find_entry(entry.id).unwrap().is_none());
    }

    #[test]
    fn test_find_entry() {
        let db = Database::open_in_memory().unwrap();
        let entry = db
            .insert_entry(&new_entry(at(15, 8), 25.0, EntryStatus::Done))
            .unwrap();
        assert_eq!(db.find_entry(entry.id).unwrap(), Some(entry));
        assert!(db.find_entry(999).unwrap().is_none());
    }

    #[test]
    fn test_in_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.in_transaction(|db| {
            db.insert_entry(&new_entry(at(15, 8), 25.0, EntryStatus::Done))?;
            anyhow::bail!("achievement save failed")
        });
        assert!(result.is_err());
        assert!(db.get_entries_for_date(date(15)).unwrap().is_empty());

        let id = db
            .in_transaction(|db| {
                let entry = db.insert_entry(&new_entry(at(15, 9), 30.0, EntryStatus::Done))?;
                Ok(entry.id)
            })
            .unwrap();
        assert!(db.find_entry(id).unwrap().is_some());
    }

    #[test]
    fn test_has_consumed_before() {
        let db = Database::open_in_memory().unwrap();
        db.insert_entry(&new_entry(at(14, 8), 25.0, EntryStatus::Planned))
            .unwrap();
        assert!(!db.has_consumed_before(date(15)).unwrap());

        db.insert_entry(&new_entry(at(14, 9), 25.0, EntryStatus::Done))
            .unwrap();
        assert!(db.has_consumed_before(date(15)).unwrap());
        assert!(!db.has_consumed_before(date(14)).unwrap());
    }

    #[test]
    fn test_targets_fall_back_to_default() {
        let db = Database::open_in_memory().unwrap();
        // 2024-06-15 is a Saturday
        assert!((db.target_for_date(date(15), 120.0).unwrap() - 120.0).abs() < f64::EPSILON);

        db.set_target(5, 90.0).unwrap();
        assert!((db.target_for_date(date(15), 120.0).unwrap() - 90.0).abs() < f64::EPSILON);
        assert!((db.target_for_date(date(14), 120.0).unwrap() - 120.0).abs() < f64::EPSILON);

        db.set_target(0, 150.0).unwrap();
        let all = db.get_all_targets().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].day_of_week, 0);

        assert!(db.clear_target(5).unwrap());
        assert!(!db.clear_target(5).unwrap());
        assert!(db.get_target(5).unwrap().is_none());
        assert!(db.clear_all_targets().unwrap());
        assert!(db.get_all_targets().unwrap().is_empty());
    }

    #[test]
    fn test_settings_feed_engine_config() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_engine_config().unwrap(), EngineConfig::default());

        db.set_setting("alpha", "0.5").unwrap();
        db.set_setting("alpha", "0.4").unwrap();
        assert_eq!(db.get_setting("alpha").unwrap().as_deref(), Some("0.4"));
        let config = db.load_engine_config().unwrap();
        assert!((config.alpha - 0.4).abs() < f64::EPSILON);

        assert!(db.delete_setting("alpha").unwrap());
        assert!(db.get_setting("alpha").unwrap().is_none());
    }

    #[test]
    fn test_streak_state_defaults_when_missing() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_streak_state().unwrap(), StreakState::default());
    }

    #[test]
    fn test_streak_state_save_and_load() {
        let db = Database::open_in_memory().unwrap();
        let state = StreakState {
            current_streak: 4,
            best_streak: 9,
            last_success_date: Some(date(14)),
            total_days_with_goal: 21,
            streak_saver_used_this_week: true,
            week_start_date: Some(date(10)),
            this_week_target_hits: 3,
            this_week_total_days: 5,
            unlocked_badges: [Badge::FirstDay, Badge::ThreeDays, Badge::OneWeek]
                .into_iter()
                .collect(),
            daily_achievements: [DailyAchievement::EarlyBird].into_iter().collect(),
            achievements_date: Some(date(15)),
            last_evaluated_date: Some(date(14)),
        };
        db.save_streak_state(&state).unwrap();
        assert_eq!(db.load_streak_state().unwrap(), state);

        let updated = StreakState {
            current_streak: 0,
            ..state
        };
        db.save_streak_state(&updated).unwrap();
        assert_eq!(db.load_streak_state().unwrap(), updated);
    }

    #[test]
    fn test_corrupted_sets_load_as_empty() {
        let db = Database::open_in_memory().unwrap();
        let state = StreakState {
            current_streak: 5,
            unlocked_badges: [Badge::FirstDay].into_iter().collect(),
            ..StreakState::default()
        };
        db.save_streak_state(&state).unwrap();
        db.conn
            .execute(
                "UPDATE streak_state SET unlocked_badges = '{not json', daily_achievements = '[\"moonwalk\"]'",
                [],
            )
            .unwrap();

        let loaded = db.load_streak_state().unwrap();
        assert_eq!(loaded.current_streak, 5);
        assert!(loaded.unlocked_badges.is_empty());
        assert!(loaded.daily_achievements.is_empty());
    }

    #[test]
    fn test_commit_day_and_previous_balance() {
        let db = Database::open_in_memory().unwrap();
        let state = StreakState {
            current_streak: 1,
            last_evaluated_date: Some(date(10)),
            ..StreakState::default()
        };
        db.commit_day(&balance(10, -30.0), &state).unwrap();
        db.commit_day(&balance(12, 10.0), &state).unwrap();

        assert_eq!(db.get_balance(date(10)).unwrap(), Some(balance(10, -30.0)));
        assert!(db.get_balance(date(11)).unwrap().is_none());

        let prev = db.get_previous_balance(date(12)).unwrap().unwrap();
        assert_eq!(prev.date, date(10));
        let prev = db.get_previous_balance(date(20)).unwrap().unwrap();
        assert_eq!(prev.date, date(12));
        assert!(db.get_previous_balance(date(10)).unwrap().is_none());

        let range = db.get_balances_between(date(1), date(30)).unwrap();
        let dates: Vec<NaiveDate> = range.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(10), date(12)]);
    }

    #[test]
    fn test_failed_commit_rolls_back_streak_state() {
        let db = Database::open_in_memory().unwrap();
        let first = StreakState {
            current_streak: 1,
            ..StreakState::default()
        };
        db.commit_day(&balance(10, 0.0), &first).unwrap();

        let second = StreakState {
            current_streak: 2,
            ..StreakState::default()
        };
        let err = db.commit_day(&balance(10, 5.0), &second).unwrap_err();
        assert!(matches!(err, ProgressError::CommitFailed(_)));

        assert_eq!(db.load_streak_state().unwrap(), first);
        assert_eq!(db.get_balance(date(10)).unwrap(), Some(balance(10, 0.0)));
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whey.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_entry(&new_entry(at(15, 8), 25.0, EntryStatus::Done))
                .unwrap();
            let state = StreakState {
                current_streak: 3,
                unlocked_badges: [Badge::FirstDay, Badge::ThreeDays].into_iter().collect(),
                ..StreakState::default()
            };
            db.commit_day(&balance(15, 0.0), &state).unwrap();
        }

        // Migrations are idempotent on an existing file
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_entries_for_date(date(15)).unwrap().len(), 1);
        let state = db.load_streak_state().unwrap();
        assert_eq!(state.current_streak, 3);
        assert_eq!(state.unlocked_badges.len(), 2);
        assert!(db.get_balance(date(15)).unwrap().is_some());
    }
}
