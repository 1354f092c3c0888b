use crate::db::{fmt_datetime, now, parse_date, Database};
use crate::error::text_field;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const PATIENT_COLUMNS: &str =
    "id, mrn, first_name, last_name, birth_date, gender, phone, created_at";

fn row_to_patient(row: &rusqlite::Row<'_>) -> Result<dto::PatientRes, rusqlite::Error> {
    Ok(dto::PatientRes {
        id: row.get(0)?,
        mrn: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        birth_date: row.get(4)?,
        gender: row.get(5)?,
        phone: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn get_patient(conn: &Connection, id: i64) -> HmsResult<dto::PatientRes> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
        params![id],
        row_to_patient,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("patient", id))
}

/// Next sequential medical record number, `MRN-000001` style.
fn next_mrn(conn: &Connection) -> HmsResult<String> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(CAST(substr(mrn, 5) AS INTEGER)) FROM patients WHERE mrn LIKE 'MRN-%'",
        [],
        |row| row.get(0),
    )?;
    Ok(format!("MRN-{:06}", max.unwrap_or(0) + 1))
}

/// Validated values for a new patient row.
pub(crate) struct NewPatient {
    pub mrn: Option<NonEmptyText>,
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
}

impl NewPatient {
    pub fn from_request(req: &dto::CreatePatientReq) -> HmsResult<Self> {
        let birth_date = match req.birth_date.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(raw) => {
                let date = parse_date(raw)
                    .map_err(|_| HmsError::validation("birth_date", "expected YYYY-MM-DD"))?;
                if date > now().date() {
                    return Err(HmsError::validation("birth_date", "cannot be in the future"));
                }
                Some(raw.to_string())
            }
        };
        Ok(Self {
            mrn: text_field("mrn", NonEmptyText::optional(req.mrn.as_deref()))?,
            first_name: text_field("first_name", NonEmptyText::new(&req.first_name))?,
            last_name: text_field("last_name", NonEmptyText::new(&req.last_name))?,
            birth_date,
            gender: text_field("gender", NonEmptyText::optional(req.gender.as_deref()))?
                .map(NonEmptyText::into_inner),
            phone: text_field("phone", NonEmptyText::optional(req.phone.as_deref()))?
                .map(NonEmptyText::into_inner),
        })
    }
}

/// Inserts a patient, assigning an MRN when none was supplied.
pub(crate) fn insert_patient(conn: &Connection, patient: &NewPatient) -> HmsResult<i64> {
    let mrn = match &patient.mrn {
        Some(mrn) => {
            let taken: Option<i64> = conn
                .query_row(
                    "SELECT id FROM patients WHERE mrn = ?1",
                    params![mrn.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(HmsError::Conflict(format!("MRN {mrn} is already in use")));
            }
            mrn.to_string()
        }
        None => next_mrn(conn)?,
    };
    conn.execute(
        "INSERT INTO patients (mrn, first_name, last_name, birth_date, gender, phone, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            mrn,
            patient.first_name.as_str(),
            patient.last_name.as_str(),
            patient.birth_date,
            patient.gender,
            patient.phone,
            fmt_datetime(&now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Clone, Debug)]
pub struct PatientService {
    db: Database,
}

impl PatientService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, req: &dto::CreatePatientReq) -> HmsResult<dto::PatientRes> {
        let patient = NewPatient::from_request(req)?;
        let created = self.db.with_transaction(|tx| {
            let id = insert_patient(tx, &patient)?;
            get_patient(tx, id)
        })?;
        tracing::info!(patient_id = created.id, mrn = %created.mrn, "patient registered");
        Ok(created)
    }

    pub fn get(&self, id: i64) -> HmsResult<dto::PatientRes> {
        self.db.with_conn(|conn| get_patient(conn, id))
    }

    /// Lists patients, optionally filtered by a case-insensitive name or MRN fragment.
    pub fn list(&self, search: Option<&str>) -> HmsResult<dto::ListPatientsRes> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));
        let patients = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATIENT_COLUMNS} FROM patients
                 WHERE ?1 IS NULL
                    OR mrn LIKE ?1
                    OR first_name LIKE ?1
                    OR last_name LIKE ?1
                 ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE, id"
            ))?;
            let rows = stmt.query_map(params![pattern], row_to_patient)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        Ok(dto::ListPatientsRes { patients })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(first: &str, last: &str) -> dto::CreatePatientReq {
        dto::CreatePatientReq {
            first_name: first.into(),
            last_name: last.into(),
            ..Default::default()
        }
    }

    #[test]
    fn mrns_are_sequential() {
        let svc = PatientService::new(Database::open_in_memory().unwrap());
        let a = svc.create(&req("Ada", "Obi")).unwrap();
        let b = svc.create(&req("Ben", "Eze")).unwrap();
        assert_eq!(a.mrn, "MRN-000001");
        assert_eq!(b.mrn, "MRN-000002");
    }

    #[test]
    fn explicit_mrn_must_be_unique() {
        let svc = PatientService::new(Database::open_in_memory().unwrap());
        let mut first = req("Ada", "Obi");
        first.mrn = Some("EXT-1".into());
        svc.create(&first).unwrap();
        let err = svc.create(&first).unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
    }

    #[test]
    fn missing_names_are_field_errors() {
        let svc = PatientService::new(Database::open_in_memory().unwrap());
        let err = svc.create(&req("", "Obi")).unwrap_err();
        assert_eq!(err.field(), Some("first_name"));
    }

    #[test]
    fn birth_date_must_parse() {
        let svc = PatientService::new(Database::open_in_memory().unwrap());
        let mut bad = req("Ada", "Obi");
        bad.birth_date = Some("01/02/1990".into());
        assert_eq!(svc.create(&bad).unwrap_err().field(), Some("birth_date"));
    }

    #[test]
    fn list_filters_and_sorts_by_name() {
        let svc = PatientService::new(Database::open_in_memory().unwrap());
        svc.create(&req("Zed", "Musa")).unwrap();
        svc.create(&req("Ada", "Bello")).unwrap();
        let all = svc.list(None).unwrap().patients;
        assert_eq!(all[0].last_name, "Bello");

        let found = svc.list(Some("mus")).unwrap().patients;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_name, "Zed");
    }
}
