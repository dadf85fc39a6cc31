//! The data-entry ledger.
//!
//! Every entry belongs to the user who created it. Regular users only ever see and touch their
//! own entries; administrators see every entry together with its owner's username.

use crate::session::SessionUser;
use crate::store::Database;
use crate::{CoreError, CoreResult};
use chrono::NaiveDate;
use oncobloom_types::NonEmptyText;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{OptionalExtension, Row};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(CoreError::InvalidInput(format!("unknown gender: {s}"))),
        }
    }
}

impl ToSql for Gender {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Gender {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

/// Contents of an entry form.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryInput {
    pub name: String,
    pub gender: Gender,
    pub amount: f64,
    pub date: NaiveDate,
}

impl EntryInput {
    fn validated(self) -> CoreResult<Self> {
        let name = NonEmptyText::new(&self.name)?.into_string();
        if !self.amount.is_finite() {
            return Err(CoreError::InvalidInput("amount must be a number".into()));
        }
        Ok(Self { name, ..self })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub gender: Gender,
    pub amount: f64,
    pub date: NaiveDate,
    /// Only filled in for administrators' views.
    pub owner_name: Option<String>,
}

/// Totals shown above an entry listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntrySummary {
    pub total_entries: usize,
    pub total_amount: f64,
    pub male_count: usize,
    pub female_count: usize,
    pub other_count: usize,
}

impl EntrySummary {
    pub fn of(entries: &[Entry]) -> Self {
        entries.iter().fold(Self::default(), |mut acc, e| {
            acc.total_entries += 1;
            acc.total_amount += e.amount;
            match e.gender {
                Gender::Male => acc.male_count += 1,
                Gender::Female => acc.female_count += 1,
                Gender::Other => acc.other_count += 1,
            }
            acc
        })
    }
}

const ENTRY_COLUMNS: &str = "e.id, e.user_id, e.name, e.gender, e.amount, e.date, u.username";

fn entry_from_row(row: &Row<'_>, with_owner: bool) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        gender: row.get(3)?,
        amount: row.get(4)?,
        date: row.get(5)?,
        owner_name: if with_owner { row.get(6)? } else { None },
    })
}

#[derive(Clone, Debug)]
pub struct EntryService {
    db: Database,
}

impl EntryService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds an entry for `actor`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Conflict` if the actor already has an entry with exactly the same
    /// name, gender, amount and date.
    pub fn create(&self, actor: &SessionUser, input: EntryInput) -> CoreResult<Entry> {
        let input = input.validated()?;
        let conn = self.db.connection()?;

        let duplicate = conn
            .query_row(
                "SELECT 1 FROM entries
                 WHERE user_id = ?1 AND name = ?2 AND gender = ?3 AND amount = ?4 AND date = ?5",
                rusqlite::params![actor.id, input.name, input.gender, input.amount, input.date],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if duplicate {
            return Err(CoreError::Conflict("duplicate entry".into()));
        }

        conn.execute(
            "INSERT INTO entries (user_id, name, gender, amount, date) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![actor.id, input.name, input.gender, input.amount, input.date],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!("{} added entry {}", actor.username, id);

        Ok(Entry {
            id,
            user_id: actor.id,
            name: input.name,
            gender: input.gender,
            amount: input.amount,
            date: input.date,
            owner_name: None,
        })
    }

    /// Entries visible to `actor`, newest first.
    pub fn list(&self, actor: &SessionUser) -> CoreResult<Vec<Entry>> {
        let conn = self.db.connection()?;
        let base = format!("SELECT {ENTRY_COLUMNS} FROM entries e JOIN users u ON e.user_id = u.id");

        let entries = if actor.is_admin {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY e.id DESC"))?;
            let rows = stmt
                .query_map([], |row| entry_from_row(row, true))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!("{base} WHERE e.user_id = ?1 ORDER BY e.id DESC"))?;
            let rows = stmt
                .query_map([actor.id], |row| entry_from_row(row, false))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(entries)
    }

    pub fn summary(&self, actor: &SessionUser) -> CoreResult<EntrySummary> {
        Ok(EntrySummary::of(&self.list(actor)?))
    }

    /// One entry, if `actor` may see it. Other users' entries look like missing ones.
    pub fn get(&self, actor: &SessionUser, id: i64) -> CoreResult<Entry> {
        let conn = self.db.connection()?;
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries e JOIN users u ON e.user_id = u.id
             WHERE e.id = ?1 AND (?2 OR e.user_id = ?3)"
        );
        conn.query_row(
            &sql,
            rusqlite::params![id, actor.is_admin, actor.id],
            |row| entry_from_row(row, actor.is_admin),
        )
        .optional()?
        .ok_or(CoreError::NotFound("entry"))
    }

    pub fn update(&self, actor: &SessionUser, id: i64, input: EntryInput) -> CoreResult<Entry> {
        let existing = self.get(actor, id)?;
        let input = input.validated()?;

        let conn = self.db.connection()?;
        conn.execute(
            "UPDATE entries SET name = ?1, gender = ?2, amount = ?3, date = ?4 WHERE id = ?5",
            rusqlite::params![input.name, input.gender, input.amount, input.date, id],
        )?;
        tracing::info!("{} updated entry {}", actor.username, id);

        Ok(Entry {
            name: input.name,
            gender: input.gender,
            amount: input.amount,
            date: input.date,
            ..existing
        })
    }

    pub fn delete(&self, actor: &SessionUser, id: i64) -> CoreResult<()> {
        let conn = self.db.connection()?;
        let deleted = conn.execute(
            "DELETE FROM entries WHERE id = ?1 AND (?2 OR user_id = ?3)",
            rusqlite::params![id, actor.is_admin, actor.id],
        )?;
        if deleted == 0 {
            return Err(CoreError::NotFound("entry"));
        }
        tracing::info!("{} deleted entry {}", actor.username, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (EntryService, SessionUser, SessionUser, SessionUser) {
        let db = Database::open_in_memory().unwrap();
        for (name, admin) in [("admin", 1), ("alice", 0), ("bob", 0)] {
            db.connection()
                .unwrap()
                .execute(
                    "INSERT INTO users (username, email, password_hash, is_admin, created_at)
                     VALUES (?1, ?1 || '@example.com', 'x', ?2, '2025-01-01 00:00:00+00:00')",
                    rusqlite::params![name, admin],
                )
                .unwrap();
        }
        let user = |id: i64, username: &str, is_admin: bool| SessionUser {
            id,
            username: username.into(),
            is_admin,
        };
        (
            EntryService::new(db),
            user(1, "admin", true),
            user(2, "alice", false),
            user(3, "bob", false),
        )
    }

    fn input(name: &str, gender: Gender, amount: f64) -> EntryInput {
        EntryInput {
            name: name.into(),
            gender,
            amount,
            date: NaiveDate::from_ymd_opt(2025, 2, 14).unwrap(),
        }
    }

    #[test]
    fn test_gender_parsing() {
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!(" Male ".parse::<Gender>().unwrap(), Gender::Male);
        assert!("unknown".parse::<Gender>().is_err());
    }

    #[test]
    fn test_exact_duplicates_are_rejected() {
        let (entries, _, alice, bob) = setup();
        entries
            .create(&alice, input("Groceries", Gender::Female, 42.5))
            .unwrap();

        let err = entries
            .create(&alice, input(" Groceries ", Gender::Female, 42.5))
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        entries
            .create(&alice, input("Groceries", Gender::Female, 43.0))
            .expect("different amount is not a duplicate");
        entries
            .create(&bob, input("Groceries", Gender::Female, 42.5))
            .expect("another user's identical entry is not a duplicate");
    }

    #[test]
    fn test_visibility() {
        let (entries, admin, alice, bob) = setup();
        let a = entries
            .create(&alice, input("Rent", Gender::Female, 500.0))
            .unwrap();
        let b = entries
            .create(&bob, input("Fuel", Gender::Male, 60.0))
            .unwrap();

        let own = entries.list(&alice).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, a.id);
        assert_eq!(own[0].owner_name, None);

        let all = entries.list(&admin).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id, "newest first");
        assert_eq!(all[0].owner_name.as_deref(), Some("bob"));

        assert!(matches!(
            entries.get(&alice, b.id),
            Err(CoreError::NotFound(_))
        ));
        assert_eq!(entries.get(&admin, b.id).unwrap().user_id, bob.id);
    }

    #[test]
    fn test_update_and_delete_are_scoped() {
        let (entries, admin, alice, bob) = setup();
        let a = entries
            .create(&alice, input("Rent", Gender::Female, 500.0))
            .unwrap();

        assert!(entries
            .update(&bob, a.id, input("Stolen", Gender::Male, 1.0))
            .is_err());
        let updated = entries
            .update(&alice, a.id, input("Rent", Gender::Female, 550.0))
            .unwrap();
        assert_eq!(updated.amount, 550.0);

        assert!(matches!(
            entries.delete(&bob, a.id),
            Err(CoreError::NotFound(_))
        ));
        entries.delete(&admin, a.id).unwrap();
        assert!(entries.list(&alice).unwrap().is_empty());
    }

    #[test]
    fn test_summary() {
        let (entries, admin, alice, bob) = setup();
        entries
            .create(&alice, input("Rent", Gender::Female, 500.0))
            .unwrap();
        entries
            .create(&bob, input("Fuel", Gender::Male, 60.0))
            .unwrap();
        entries
            .create(&bob, input("Gift", Gender::Other, 15.5))
            .unwrap();

        let all = entries.summary(&admin).unwrap();
        assert_eq!(all.total_entries, 3);
        assert_eq!(all.total_amount, 575.5);
        assert_eq!(
            (all.male_count, all.female_count, all.other_count),
            (1, 1, 1)
        );

        let bobs = entries.summary(&bob).unwrap();
        assert_eq!(bobs.total_entries, 2);
        assert_eq!(bobs.total_amount, 75.5);
    }
}
