//! Request and response bodies.
//!
//! Field names are the JSON names. Optional patient attributes are `Option` and are omitted
//! from responses when absent.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
    pub database: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageRes {
    pub message: String,
}

impl MessageRes {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A session token to send back in the `x-session-token` header.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionRes {
    pub token: String,
}

// Accounts

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UserRes {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub created_at: String,
}

/// An account as listed on the administration page.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminUserRes {
    #[serde(flatten)]
    pub user: UserRes,
    /// Patient records this account created.
    pub patient_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListUsersRes {
    pub users: Vec<AdminUserRes>,
    pub total_users: i64,
    pub total_patients: i64,
    pub total_admins: i64,
}

/// Login by username or e-mail address.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginReq {
    pub identity: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRes {
    pub token: String,
    pub user: UserRes,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordReq {
    pub identity: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRes {
    pub code_delivered: bool,
    pub expires_at: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpReq {
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordReq {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

// Patients

/// Patient attributes accepted on create and update.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PatientReq {
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

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub patient_id: String,
    #[serde(flatten)]
    pub details: PatientReq,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    pub created_at: String,
}

/// Listing filters. Empty values mean "any".
#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListPatientsQuery {
    pub status: Option<String>,
    pub cancer_type: Option<String>,
    pub cancer_stage: Option<String>,
    /// Substring matched against name, identifier, cancer type and stage, doctor and status.
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct FilterOptionsRes {
    pub statuses: Vec<String>,
    pub cancer_types: Vec<String>,
    pub cancer_stages: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListPatientsRes {
    pub patients: Vec<PatientRes>,
    pub filters: FilterOptionsRes,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CountRes {
    pub value: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientStatsRes {
    pub total: i64,
    pub active_treatment: i64,
    pub stage_iv: i64,
    pub recovered: i64,
    pub by_stage: Vec<CountRes>,
    pub by_status: Vec<CountRes>,
    pub recent: Vec<PatientRes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientAnalyticsRes {
    pub by_status: Vec<CountRes>,
    pub by_cancer_type: Vec<CountRes>,
    pub by_gender: Vec<CountRes>,
    pub by_stage: Vec<CountRes>,
    /// `Under 18`, `18-35`, `36-50`, `51-65` and `Over 65`, in that order.
    pub age_groups: Vec<CountRes>,
    /// Diagnoses per `YYYY-MM` over the last twelve months, oldest first.
    pub monthly_diagnoses: Vec<CountRes>,
}

// Ledger entries

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryReq {
    pub name: String,
    /// `Male`, `Female` or `Other`.
    pub gender: String,
    pub amount: f64,
    pub date: NaiveDate,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryRes {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub gender: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EntrySummaryRes {
    pub total_entries: usize,
    pub total_amount: f64,
    pub male_count: usize,
    pub female_count: usize,
    pub other_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListEntriesRes {
    pub entries: Vec<EntryRes>,
    pub summary: EntrySummaryRes,
}
