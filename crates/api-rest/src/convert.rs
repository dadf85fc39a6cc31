//! Conversions between wire types and core types.

use api_shared::{
    AdminUserRes, CountRes, EntryReq, EntryRes, EntrySummaryRes, FilterOptionsRes,
    ListPatientsQuery, ListUsersRes, PatientAnalyticsRes, PatientReq, PatientRes,
    PatientStatsRes, UserRes,
};
use oncobloom_core::entries::{Entry, EntryInput, EntrySummary};
use oncobloom_core::patients::{
    CountBy, PatientAnalytics, PatientDetails, PatientFilterOptions, PatientListFilter,
    PatientRecord, PatientStats,
};
use oncobloom_core::users::{User, UserOverview};
use oncobloom_core::CoreResult;

pub fn user_res(user: &User) -> UserRes {
    UserRes {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        is_admin: user.is_admin,
        created_at: user.created_at.to_rfc3339(),
    }
}

pub fn overview_res(overview: UserOverview) -> ListUsersRes {
    ListUsersRes {
        users: overview
            .users
            .iter()
            .map(|summary| AdminUserRes {
                user: user_res(&summary.user),
                patient_count: summary.patient_count,
            })
            .collect(),
        total_users: overview.total_users,
        total_patients: overview.total_patients,
        total_admins: overview.total_admins,
    }
}

pub fn patient_details(req: PatientReq) -> PatientDetails {
    PatientDetails {
        full_name: req.full_name,
        age: req.age,
        gender: req.gender,
        blood_group: req.blood_group,
        contact_number: req.contact_number,
        email: req.email,
        city: req.city,
        state: req.state,
        emergency_contact_name: req.emergency_contact_name,
        emergency_contact_number: req.emergency_contact_number,
        cancer_type: req.cancer_type,
        cancer_stage: req.cancer_stage,
        tumor_size: req.tumor_size,
        metastasis: req.metastasis,
        diagnosis_date: req.diagnosis_date,
        treatment_type: req.treatment_type,
        treatment_phase: req.treatment_phase,
        chemo_cycles_planned: req.chemo_cycles_planned,
        chemo_cycles_completed: req.chemo_cycles_completed,
        radiation_sessions_planned: req.radiation_sessions_planned,
        radiation_sessions_completed: req.radiation_sessions_completed,
        surgery_status: req.surgery_status,
        doctor_name: req.doctor_name,
        hospital_name: req.hospital_name,
        height: req.height,
        weight: req.weight,
        blood_pressure: req.blood_pressure,
        heart_rate: req.heart_rate,
        risk_level: req.risk_level,
        current_status: req.current_status,
        next_appointment: req.next_appointment,
    }
}

fn patient_req(details: PatientDetails) -> PatientReq {
    PatientReq {
        full_name: details.full_name,
        age: details.age,
        gender: details.gender,
        blood_group: details.blood_group,
        contact_number: details.contact_number,
        email: details.email,
        city: details.city,
        state: details.state,
        emergency_contact_name: details.emergency_contact_name,
        emergency_contact_number: details.emergency_contact_number,
        cancer_type: details.cancer_type,
        cancer_stage: details.cancer_stage,
        tumor_size: details.tumor_size,
        metastasis: details.metastasis,
        diagnosis_date: details.diagnosis_date,
        treatment_type: details.treatment_type,
        treatment_phase: details.treatment_phase,
        chemo_cycles_planned: details.chemo_cycles_planned,
        chemo_cycles_completed: details.chemo_cycles_completed,
        radiation_sessions_planned: details.radiation_sessions_planned,
        radiation_sessions_completed: details.radiation_sessions_completed,
        surgery_status: details.surgery_status,
        doctor_name: details.doctor_name,
        hospital_name: details.hospital_name,
        height: details.height,
        weight: details.weight,
        blood_pressure: details.blood_pressure,
        heart_rate: details.heart_rate,
        risk_level: details.risk_level,
        current_status: details.current_status,
        next_appointment: details.next_appointment,
    }
}

pub fn patient_res(record: PatientRecord) -> PatientRes {
    PatientRes {
        patient_id: record.patient_id,
        details: patient_req(record.details),
        bmi: record.bmi,
        created_by: record.created_by,
        created_at: record.created_at.to_rfc3339(),
    }
}

pub fn list_filter(query: ListPatientsQuery) -> PatientListFilter {
    PatientListFilter {
        status: query.status,
        cancer_type: query.cancer_type,
        cancer_stage: query.cancer_stage,
        search: query.search,
    }
}

pub fn filter_options_res(options: PatientFilterOptions) -> FilterOptionsRes {
    FilterOptionsRes {
        statuses: options.statuses,
        cancer_types: options.cancer_types,
        cancer_stages: options.cancer_stages,
    }
}

fn count_res(count: CountBy) -> CountRes {
    CountRes {
        value: count.value,
        count: count.count,
    }
}

pub fn stats_res(stats: PatientStats) -> PatientStatsRes {
    PatientStatsRes {
        total: stats.total,
        active_treatment: stats.active_treatment,
        stage_iv: stats.stage_iv,
        recovered: stats.recovered,
        by_stage: stats.by_stage.into_iter().map(count_res).collect(),
        by_status: stats.by_status.into_iter().map(count_res).collect(),
        recent: stats.recent.into_iter().map(patient_res).collect(),
    }
}

pub fn analytics_res(analytics: PatientAnalytics) -> PatientAnalyticsRes {
    let counts = |v: Vec<CountBy>| v.into_iter().map(count_res).collect();
    PatientAnalyticsRes {
        by_status: counts(analytics.by_status),
        by_cancer_type: counts(analytics.by_cancer_type),
        by_gender: counts(analytics.by_gender),
        by_stage: counts(analytics.by_stage),
        age_groups: counts(analytics.age_groups),
        monthly_diagnoses: counts(analytics.monthly_diagnoses),
    }
}

/// Fails with `InvalidInput` when the gender is not one of the three accepted values.
pub fn entry_input(req: EntryReq) -> CoreResult<EntryInput> {
    Ok(EntryInput {
        gender: req.gender.parse()?,
        name: req.name,
        amount: req.amount,
        date: req.date,
    })
}

pub fn entry_res(entry: Entry) -> EntryRes {
    EntryRes {
        id: entry.id,
        user_id: entry.user_id,
        name: entry.name,
        gender: entry.gender.to_string(),
        amount: entry.amount,
        date: entry.date,
        owner_name: entry.owner_name,
    }
}

pub fn summary_res(summary: EntrySummary) -> EntrySummaryRes {
    EntrySummaryRes {
        total_entries: summary.total_entries,
        total_amount: summary.total_amount,
        male_count: summary.male_count,
        female_count: summary.female_count,
        other_count: summary.other_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use oncobloom_core::entries::Gender;
    use oncobloom_core::CoreError;

    #[test]
    fn test_entry_input_parses_gender() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let input = entry_input(EntryReq {
            name: "Ravi".into(),
            gender: "female".into(),
            amount: 12.5,
            date,
        })
        .unwrap();
        assert_eq!(input.gender, Gender::Female);

        let err = entry_input(EntryReq {
            name: "Ravi".into(),
            gender: "unknown".into(),
            amount: 12.5,
            date,
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_patient_res_keeps_details() {
        let record = PatientRecord {
            id: 7,
            patient_id: "ONC-2025-0007".into(),
            details: PatientDetails {
                full_name: "Jane Smith".into(),
                age: 54,
                height: Some(165.0),
                ..Default::default()
            },
            bmi: Some(22.04),
            created_by: Some(2),
            created_at: Utc::now(),
        };

        let res = patient_res(record);
        assert_eq!(res.patient_id, "ONC-2025-0007");
        assert_eq!(res.details.full_name, "Jane Smith");
        assert_eq!(res.details.height, Some(165.0));
        assert_eq!(res.bmi, Some(22.04));
        assert_eq!(patient_details(res.details).age, 54);
    }
}
