//! # Patient records
//!
//! Comprehensive oncology patient records. Each record gets a `PREFIX-YYYY-NNNN` identifier
//! when it is created; the identifier is reserved and the row inserted in the same write
//! transaction, so a record is never stored without a freshly reserved identifier.
//!
//! Any logged-in user may create and view records. Changing or deleting a record is limited to
//! administrators and the user who created it.

use crate::config::CoreConfig;
use crate::constants::{PATIENT_ID_INSERT_ATTEMPTS, PATIENT_SEARCH_COLUMNS};
use crate::error::is_unique_violation;
use crate::filter::{FilterSpec, QueryPredicate};
use crate::patient_id::{next_sequence, PatientIdentifier};
use crate::session::SessionUser;
use crate::store::Database;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;

/// Editable attributes of a patient.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatientDetails {
    pub full_name: String,
    pub age: u32,
    pub gender: String,
    pub blood_group: Option<String>,
    pub contact_number: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub cancer_type: String,
    pub cancer_stage: String,
    pub tumor_size: Option<f64>,
    pub metastasis: Option<String>,
    pub diagnosis_date: Option<NaiveDate>,
    pub treatment_type: Option<String>,
    pub treatment_phase: Option<String>,
    pub chemo_cycles_planned: Option<u32>,
    pub chemo_cycles_completed: Option<u32>,
    pub radiation_sessions_planned: Option<u32>,
    pub radiation_sessions_completed: Option<u32>,
    pub surgery_status: Option<String>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    /// Centimetres.
    pub height: Option<f64>,
    /// Kilograms.
    pub weight: Option<f64>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<u32>,
    pub risk_level: Option<String>,
    pub current_status: String,
    pub next_appointment: Option<NaiveDate>,
}

fn trim_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl PatientDetails {
    /// Trims text fields and turns blank optional text into `None`.
    pub fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.trim().to_owned(),
            gender: self.gender.trim().to_owned(),
            cancer_type: self.cancer_type.trim().to_owned(),
            cancer_stage: self.cancer_stage.trim().to_owned(),
            current_status: self.current_status.trim().to_owned(),
            blood_group: trim_opt(self.blood_group),
            contact_number: trim_opt(self.contact_number),
            email: trim_opt(self.email),
            city: trim_opt(self.city),
            state: trim_opt(self.state),
            emergency_contact_name: trim_opt(self.emergency_contact_name),
            emergency_contact_number: trim_opt(self.emergency_contact_number),
            metastasis: trim_opt(self.metastasis),
            treatment_type: trim_opt(self.treatment_type),
            treatment_phase: trim_opt(self.treatment_phase),
            surgery_status: trim_opt(self.surgery_status),
            doctor_name: trim_opt(self.doctor_name),
            hospital_name: trim_opt(self.hospital_name),
            blood_pressure: trim_opt(self.blood_pressure),
            risk_level: trim_opt(self.risk_level),
            ..self
        }
    }

    /// Checks required fields and value ranges as of `today`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` naming the first problem found.
    pub fn validate(&self, today: NaiveDate) -> CoreResult<()> {
        let required = [
            ("full name", &self.full_name),
            ("gender", &self.gender),
            ("cancer type", &self.cancer_type),
            ("cancer stage", &self.cancer_stage),
            ("current status", &self.current_status),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }

        if !(1..=150).contains(&self.age) {
            return Err(CoreError::InvalidInput(
                "age must be between 1 and 150".into(),
            ));
        }

        if let Some(diagnosed) = self.diagnosis_date {
            if diagnosed > today {
                return Err(CoreError::InvalidInput(
                    "diagnosis date cannot be in the future".into(),
                ));
            }
            let earliest = today
                .checked_sub_months(Months::new(100 * 12))
                .unwrap_or(NaiveDate::MIN);
            if diagnosed < earliest {
                return Err(CoreError::InvalidInput(
                    "diagnosis date cannot be more than 100 years in the past".into(),
                ));
            }
        }

        let measurements = [
            ("tumor size", self.tumor_size),
            ("height", self.height),
            ("weight", self.weight),
        ];
        for (name, value) in measurements {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(CoreError::InvalidInput(format!(
                        "{name} must be a non-negative number"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Body-mass index from height (cm) and weight (kg), rounded to two decimals.
    pub fn bmi(&self) -> Option<f64> {
        let (height_cm, weight_kg) = (self.height?, self.weight?);
        if height_cm <= 0.0 {
            return None;
        }
        let height_m = height_cm / 100.0;
        Some((weight_kg / (height_m * height_m) * 100.0).round() / 100.0)
    }
}

/// A stored patient record.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientRecord {
    pub id: i64,
    pub patient_id: String,
    pub details: PatientDetails,
    pub bmi: Option<f64>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

const PATIENT_COLUMNS: &str = "id, patient_id, full_name, age, gender, blood_group, \
    contact_number, email, city, state, emergency_contact_name, emergency_contact_number, \
    cancer_type, cancer_stage, tumor_size, metastasis, diagnosis_date, treatment_type, \
    treatment_phase, chemo_cycles_planned, chemo_cycles_completed, radiation_sessions_planned, \
    radiation_sessions_completed, surgery_status, doctor_name, hospital_name, height, weight, \
    bmi, blood_pressure, heart_rate, risk_level, current_status, next_appointment, created_by, \
    created_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientRecord> {
    Ok(PatientRecord {
        id: row.get("id")?,
        patient_id: row.get("patient_id")?,
        details: PatientDetails {
            full_name: row.get("full_name")?,
            age: row.get("age")?,
            gender: row.get("gender")?,
            blood_group: row.get("blood_group")?,
            contact_number: row.get("contact_number")?,
            email: row.get("email")?,
            city: row.get("city")?,
            state: row.get("state")?,
            emergency_contact_name: row.get("emergency_contact_name")?,
            emergency_contact_number: row.get("emergency_contact_number")?,
            cancer_type: row.get("cancer_type")?,
            cancer_stage: row.get("cancer_stage")?,
            tumor_size: row.get("tumor_size")?,
            metastasis: row.get("metastasis")?,
            diagnosis_date: row.get("diagnosis_date")?,
            treatment_type: row.get("treatment_type")?,
            treatment_phase: row.get("treatment_phase")?,
            chemo_cycles_planned: row.get("chemo_cycles_planned")?,
            chemo_cycles_completed: row.get("chemo_cycles_completed")?,
            radiation_sessions_planned: row.get("radiation_sessions_planned")?,
            radiation_sessions_completed: row.get("radiation_sessions_completed")?,
            surgery_status: row.get("surgery_status")?,
            doctor_name: row.get("doctor_name")?,
            hospital_name: row.get("hospital_name")?,
            height: row.get("height")?,
            weight: row.get("weight")?,
            blood_pressure: row.get("blood_pressure")?,
            heart_rate: row.get("heart_rate")?,
            risk_level: row.get("risk_level")?,
            current_status: row.get("current_status")?,
            next_appointment: row.get("next_appointment")?,
        },
        bmi: row.get("bmi")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn find_patient(conn: &Connection, patient_id: &str) -> CoreResult<PatientRecord> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_id = ?1"),
        [patient_id.trim()],
        patient_from_row,
    )
    .optional()?
    .ok_or(CoreError::NotFound("patient"))
}

/// Overwrites the editable columns of row `id`. `NotFound` if the row is gone.
fn write_details(
    conn: &Connection,
    id: i64,
    details: &PatientDetails,
    bmi: Option<f64>,
) -> CoreResult<()> {
    let d = details;
    let changed = conn.execute(
        "UPDATE patients SET
            full_name = ?1, age = ?2, gender = ?3, blood_group = ?4, contact_number = ?5,
            email = ?6, city = ?7, state = ?8, emergency_contact_name = ?9,
            emergency_contact_number = ?10, cancer_type = ?11, cancer_stage = ?12,
            tumor_size = ?13, metastasis = ?14, diagnosis_date = ?15, treatment_type = ?16,
            treatment_phase = ?17, chemo_cycles_planned = ?18, chemo_cycles_completed = ?19,
            radiation_sessions_planned = ?20, radiation_sessions_completed = ?21,
            surgery_status = ?22, doctor_name = ?23, hospital_name = ?24, height = ?25,
            weight = ?26, bmi = ?27, blood_pressure = ?28, heart_rate = ?29,
            risk_level = ?30, current_status = ?31, next_appointment = ?32
         WHERE id = ?33",
        rusqlite::params![
            d.full_name,
            d.age,
            d.gender,
            d.blood_group,
            d.contact_number,
            d.email,
            d.city,
            d.state,
            d.emergency_contact_name,
            d.emergency_contact_number,
            d.cancer_type,
            d.cancer_stage,
            d.tumor_size,
            d.metastasis,
            d.diagnosis_date,
            d.treatment_type,
            d.treatment_phase,
            d.chemo_cycles_planned,
            d.chemo_cycles_completed,
            d.radiation_sessions_planned,
            d.radiation_sessions_completed,
            d.surgery_status,
            d.doctor_name,
            d.hospital_name,
            d.height,
            d.weight,
            bmi,
            d.blood_pressure,
            d.heart_rate,
            d.risk_level,
            d.current_status,
            d.next_appointment,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(CoreError::NotFound("patient"));
    }
    Ok(())
}

fn delete_row(conn: &Connection, id: i64) -> CoreResult<()> {
    if conn.execute("DELETE FROM patients WHERE id = ?1", [id])? == 0 {
        return Err(CoreError::NotFound("patient"));
    }
    Ok(())
}

/// Row counts per distinct value of `column`, ordered by value.
fn count_by(conn: &Connection, column: &str) -> CoreResult<Vec<CountBy>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM patients GROUP BY {column} ORDER BY {column}"
    ))?;
    let counts = stmt
        .query_map([], |row| {
            Ok(CountBy {
                value: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}

/// Listing filters as submitted by the records page. Blank values mean "any".
#[derive(Clone, Debug, Default)]
pub struct PatientListFilter {
    pub status: Option<String>,
    pub cancer_type: Option<String>,
    pub cancer_stage: Option<String>,
    pub search: Option<String>,
}

impl PatientListFilter {
    pub fn predicate(&self) -> CoreResult<QueryPredicate> {
        Ok(FilterSpec::new()
            .field("current_status", self.status.as_deref())
            .field("cancer_type", self.cancer_type.as_deref())
            .field("cancer_stage", self.cancer_stage.as_deref())
            .free_text(self.search.as_deref(), PATIENT_SEARCH_COLUMNS)
            .build()?)
    }
}

/// Distinct values present in the table, for populating filter drop-downs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientFilterOptions {
    pub statuses: Vec<String>,
    pub cancer_types: Vec<String>,
    pub cancer_stages: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountBy {
    pub value: String,
    pub count: i64,
}

/// Dashboard figures.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientStats {
    pub total: i64,
    pub active_treatment: i64,
    pub stage_iv: i64,
    pub recovered: i64,
    pub by_stage: Vec<CountBy>,
    pub by_status: Vec<CountBy>,
    pub recent: Vec<PatientRecord>,
}

/// Age bands reported by [`PatientService::analytics`], in display order.
pub const AGE_GROUPS: [&str; 5] = ["Under 18", "18-35", "36-50", "51-65", "Over 65"];

/// Band for an age in years.
pub fn age_group(age: u32) -> &'static str {
    match age {
        0..=17 => AGE_GROUPS[0],
        18..=35 => AGE_GROUPS[1],
        36..=50 => AGE_GROUPS[2],
        51..=65 => AGE_GROUPS[3],
        _ => AGE_GROUPS[4],
    }
}

/// Distributions for the analytics charts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientAnalytics {
    pub by_status: Vec<CountBy>,
    pub by_cancer_type: Vec<CountBy>,
    pub by_gender: Vec<CountBy>,
    pub by_stage: Vec<CountBy>,
    /// Every band of [`AGE_GROUPS`], including empty ones.
    pub age_groups: Vec<CountBy>,
    /// Diagnoses per `YYYY-MM` over the last twelve months, oldest first.
    pub monthly_diagnoses: Vec<CountBy>,
}

const RECENT_PATIENTS: i64 = 10;

#[derive(Clone, Debug)]
pub struct PatientService {
    db: Database,
    cfg: Arc<CoreConfig>,
}

impl PatientService {
    pub fn new(db: Database, cfg: Arc<CoreConfig>) -> Self {
        Self { db, cfg }
    }

    /// Validates and stores a new record under a freshly allocated identifier.
    ///
    /// If the identifier collides with a row the counter did not know about, that sequence
    /// number is skipped and allocation is retried, up to [`PATIENT_ID_INSERT_ATTEMPTS`] times.
    pub fn create(&self, actor: &SessionUser, details: PatientDetails) -> CoreResult<PatientRecord> {
        let now = Utc::now();
        let details = details.normalized();
        details.validate(now.date_naive())?;

        let mut attempt = 1;
        loop {
            match self.insert(actor, &details, now) {
                Err(e) if e.is_retryable() && attempt < PATIENT_ID_INSERT_ATTEMPTS => {
                    tracing::warn!("{}; retrying (attempt {})", e, attempt);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn insert(
        &self,
        actor: &SessionUser,
        details: &PatientDetails,
        now: DateTime<Utc>,
    ) -> CoreResult<PatientRecord> {
        let prefix = self.cfg.patient_id_prefix();
        let year = now.year();
        let bmi = details.bmi();

        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let sequence = next_sequence(&tx, prefix, year)?;
        let patient_id = PatientIdentifier::new(prefix, year, sequence)?.to_string();

        let d = details;
        let inserted = tx.execute(
            "INSERT INTO patients (
                patient_id, full_name, age, gender, blood_group, contact_number, email,
                city, state, emergency_contact_name, emergency_contact_number,
                cancer_type, cancer_stage, tumor_size, metastasis, diagnosis_date,
                treatment_type, treatment_phase, chemo_cycles_planned, chemo_cycles_completed,
                radiation_sessions_planned, radiation_sessions_completed, surgery_status,
                doctor_name, hospital_name, height, weight, bmi, blood_pressure, heart_rate,
                risk_level, current_status, next_appointment, created_by, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                       ?31, ?32, ?33, ?34, ?35)",
            rusqlite::params![
                patient_id,
                d.full_name,
                d.age,
                d.gender,
                d.blood_group,
                d.contact_number,
                d.email,
                d.city,
                d.state,
                d.emergency_contact_name,
                d.emergency_contact_number,
                d.cancer_type,
                d.cancer_stage,
                d.tumor_size,
                d.metastasis,
                d.diagnosis_date,
                d.treatment_type,
                d.treatment_phase,
                d.chemo_cycles_planned,
                d.chemo_cycles_completed,
                d.radiation_sessions_planned,
                d.radiation_sessions_completed,
                d.surgery_status,
                d.doctor_name,
                d.hospital_name,
                d.height,
                d.weight,
                bmi,
                d.blood_pressure,
                d.heart_rate,
                d.risk_level,
                d.current_status,
                d.next_appointment,
                actor.id,
                now,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                // Keep the counter bump so the next attempt moves past the taken identifier.
                tx.commit()?;
                return Err(CoreError::DuplicateIdentifier(patient_id));
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!("{} registered patient {}", actor.username, patient_id);
        Ok(PatientRecord {
            id,
            patient_id,
            details: details.clone(),
            bmi,
            created_by: Some(actor.id),
            created_at: now,
        })
    }

    /// Records matching `filter`, newest first.
    pub fn list(&self, filter: &PatientListFilter) -> CoreResult<Vec<PatientRecord>> {
        let predicate = filter.predicate()?;
        let sql = format!(
            "SELECT {PATIENT_COLUMNS} FROM patients{} ORDER BY created_at DESC, id DESC",
            predicate.where_clause()
        );

        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                rusqlite::params_from_iter(predicate.params()),
                patient_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get(&self, patient_id: &str) -> CoreResult<PatientRecord> {
        let conn = self.db.connection()?;
        find_patient(&conn, patient_id)
    }

    fn require_owner_or_admin(actor: &SessionUser, record: &PatientRecord) -> CoreResult<()> {
        if actor.is_admin || record.created_by == Some(actor.id) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(
                "only administrators and the record's creator may change it",
            ))
        }
    }

    /// Replaces the editable attributes of a record. The identifier never changes.
    ///
    /// The lookup, permission check and write run in one write transaction.
    pub fn update(
        &self,
        actor: &SessionUser,
        patient_id: &str,
        details: PatientDetails,
    ) -> CoreResult<PatientRecord> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = find_patient(&tx, patient_id)?;
        Self::require_owner_or_admin(actor, &existing)?;

        let details = details.normalized();
        details.validate(Utc::now().date_naive())?;
        let bmi = details.bmi();
        write_details(&tx, existing.id, &details, bmi)?;
        tx.commit()?;

        tracing::info!("{} updated patient {}", actor.username, existing.patient_id);
        Ok(PatientRecord {
            details,
            bmi,
            ..existing
        })
    }

    pub fn delete(&self, actor: &SessionUser, patient_id: &str) -> CoreResult<()> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = find_patient(&tx, patient_id)?;
        Self::require_owner_or_admin(actor, &existing)?;

        delete_row(&tx, existing.id)?;
        tx.commit()?;
        tracing::info!("{} deleted patient {}", actor.username, existing.patient_id);
        Ok(())
    }

    pub fn filter_options(&self) -> CoreResult<PatientFilterOptions> {
        let conn = self.db.connection()?;
        let distinct = |column: &str| -> CoreResult<Vec<String>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT {column} FROM patients WHERE {column} IS NOT NULL ORDER BY {column}"
            ))?;
            let values = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(values)
        };

        Ok(PatientFilterOptions {
            statuses: distinct("current_status")?,
            cancer_types: distinct("cancer_type")?,
            cancer_stages: distinct("cancer_stage")?,
        })
    }

    pub fn stats(&self) -> CoreResult<PatientStats> {
        let conn = self.db.connection()?;
        let count_where = |column: &str, value: &str| -> CoreResult<i64> {
            Ok(conn.query_row(
                &format!("SELECT COUNT(*) FROM patients WHERE {column} = ?1"),
                [value],
                |row| row.get(0),
            )?)
        };

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        let recent = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([RECENT_PATIENTS], patient_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        Ok(PatientStats {
            total,
            active_treatment: count_where("current_status", "Active Treatment")?,
            stage_iv: count_where("cancer_stage", "Stage IV")?,
            recovered: count_where("current_status", "Recovered")?,
            by_stage: count_by(&conn, "cancer_stage")?,
            by_status: count_by(&conn, "current_status")?,
            recent,
        })
    }

    /// Analytics as of today.
    pub fn analytics(&self) -> CoreResult<PatientAnalytics> {
        self.analytics_as_of(Utc::now().date_naive())
    }

    /// Analytics with the diagnosis trend covering the twelve months up to `today`.
    pub fn analytics_as_of(&self, today: NaiveDate) -> CoreResult<PatientAnalytics> {
        let conn = self.db.connection()?;

        let mut age_groups: Vec<CountBy> = AGE_GROUPS
            .iter()
            .map(|group| CountBy {
                value: (*group).to_owned(),
                count: 0,
            })
            .collect();
        {
            let mut stmt = conn.prepare("SELECT age, COUNT(*) FROM patients GROUP BY age")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (age, count) = row?;
                if let Some(band) = age_groups.iter_mut().find(|b| b.value == age_group(age)) {
                    band.count += count;
                }
            }
        }

        let since = today
            .checked_sub_months(Months::new(12))
            .unwrap_or(NaiveDate::MIN);
        let monthly_diagnoses = {
            let mut stmt = conn.prepare(
                "SELECT strftime('%Y-%m', diagnosis_date) AS month, COUNT(*) FROM patients
                 WHERE diagnosis_date >= ?1 AND diagnosis_date <= ?2
                 GROUP BY month ORDER BY month",
            )?;
            let counts = stmt
                .query_map(rusqlite::params![since, today], |row| {
                    Ok(CountBy {
                        value: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            counts
        };

        Ok(PatientAnalytics {
            by_status: count_by(&conn, "current_status")?,
            by_cancer_type: count_by(&conn, "cancer_type")?,
            by_gender: count_by(&conn, "gender")?,
            by_stage: count_by(&conn, "cancer_stage")?,
            age_groups,
            monthly_diagnoses,
        })
    }
}
