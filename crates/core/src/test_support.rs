//! Shared fixture for unit tests: an in-memory database with one department, ward, patient and
//! one user per clinical role.

use crate::cache::CacheService;
use crate::db::{now, Database};
use crate::models::{EncounterType, User, UserRole};
use crate::repositories::appointments::{insert_appointment, NewAppointment};
use crate::repositories::encounters::insert_encounter;
use crate::repositories::master_data::{
    insert_bed, insert_department, insert_drug, insert_lab_test, insert_ward, NewDrug,
};
use crate::repositories::patients::{insert_patient, NewPatient};
use crate::repositories::users::{get_user, insert_user};
use hms_types::NonEmptyText;
use std::time::Duration;

pub(crate) struct Fixture {
    pub db: Database,
    pub department_id: i64,
    pub ward_id: i64,
    pub patient_id: i64,
    pub admin_id: i64,
    pub doctor_id: i64,
    pub nurse_id: i64,
    pub cashier_id: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        let ids = db
            .with_conn(|c| {
                let department_id = insert_department(c, "General Medicine", "GEN")?;
                let ward_id = insert_ward(c, "Ward A", Some(department_id))?;
                let patient_id = insert_patient(
                    c,
                    &NewPatient {
                        mrn: None,
                        first_name: NonEmptyText::new("Ada")?,
                        last_name: NonEmptyText::new("Obi")?,
                        birth_date: None,
                        gender: None,
                        phone: None,
                    },
                )?;
                let admin = insert_user(c, "Admin", "admin@example.org", UserRole::Admin)?.0;
                let doctor = insert_user(c, "Dr House", "house@example.org", UserRole::Doctor)?.0;
                let nurse = insert_user(c, "Nurse Joy", "joy@example.org", UserRole::Nurse)?.0;
                let cashier = insert_user(c, "Cash Desk", "cash@example.org", UserRole::Cashier)?.0;
                Ok((department_id, ward_id, patient_id, admin.id, doctor.id, nurse.id, cashier.id))
            })
            .expect("fixture data");
        Self {
            db,
            department_id: ids.0,
            ward_id: ids.1,
            patient_id: ids.2,
            admin_id: ids.3,
            doctor_id: ids.4,
            nurse_id: ids.5,
            cashier_id: ids.6,
        }
    }

    pub fn cache(&self) -> CacheService {
        CacheService::new(self.db.clone(), Duration::from_secs(3600))
    }

    fn user(&self, id: i64) -> User {
        self.db.with_conn(|c| get_user(c, id)).expect("fixture user")
    }

    pub fn admin(&self) -> User {
        self.user(self.admin_id)
    }

    pub fn doctor(&self) -> User {
        self.user(self.doctor_id)
    }

    pub fn nurse(&self) -> User {
        self.user(self.nurse_id)
    }

    pub fn cashier(&self) -> User {
        self.user(self.cashier_id)
    }

    pub fn add_user(&self, name: &str, email: &str, role: UserRole) -> User {
        self.db
            .with_conn(|c| insert_user(c, name, email, role))
            .expect("fixture extra user")
            .0
    }

    fn encounter(&self, encounter_type: EncounterType) -> i64 {
        self.db
            .with_conn(|c| {
                insert_encounter(c, self.patient_id, encounter_type, Some(self.department_id), now())
            })
            .expect("fixture encounter")
    }

    pub fn ipd_encounter(&self) -> i64 {
        self.encounter(EncounterType::Ipd)
    }

    pub fn opd_encounter(&self) -> i64 {
        self.encounter(EncounterType::Opd)
    }

    /// Books an appointment for the fixture patient and returns its (encounter) id.
    pub fn appointment(&self) -> i64 {
        self.db
            .with_conn(|c| {
                insert_appointment(
                    c,
                    &NewAppointment {
                        patient_id: self.patient_id,
                        physician_id: self.doctor_id,
                        department_id: self.department_id,
                        scheduled_at: now(),
                        notes: None,
                    },
                )
            })
            .expect("fixture appointment")
    }

    pub fn bed(&self, number: &str) -> i64 {
        self.db
            .with_conn(|c| insert_bed(c, self.ward_id, number))
            .expect("fixture bed")
    }

    pub fn lab_test(&self, name: &str, code: &str) -> i64 {
        self.db
            .with_conn(|c| insert_lab_test(c, name, code, 1_000))
            .expect("fixture lab test")
    }

    pub fn drug(&self, name: &str, stock_quantity: i64) -> i64 {
        self.db
            .with_conn(|c| {
                insert_drug(
                    c,
                    &NewDrug {
                        name,
                        stock_quantity,
                        unit_price_cents: 50,
                        ..Default::default()
                    },
                )
            })
            .expect("fixture drug")
    }
}
