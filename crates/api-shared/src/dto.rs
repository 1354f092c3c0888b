//! Request and response payloads shared by the REST API, core services and CLI.
//!
//! Enumerated values (categories, statuses, methods) travel as their lowercase/uppercase wire
//! strings; `hms-core` parses and validates them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

// ============================================================================
// MASTER DATA OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DepartmentOption {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WardOption {
    pub id: i64,
    pub name: String,
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LabTestOption {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DrugOption {
    pub id: i64,
    pub name: String,
    pub form: Option<String>,
    pub strength: Option<String>,
    pub unit_price_cents: i64,
    pub available_quantity: i64,
}

// ============================================================================
// PATIENTS & ENCOUNTERS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreatePatientReq {
    pub mrn: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub id: i64,
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListPatientsRes {
    pub patients: Vec<PatientRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdmitPatientReq {
    pub patient_id: i64,
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EncounterRes {
    pub id: i64,
    pub patient_id: i64,
    pub encounter_type: String,
    pub status: String,
    pub department_id: Option<i64>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DepartmentStat {
    pub department_id: i64,
    pub name: String,
    pub active_encounters: i64,
    pub appointments_today: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DepartmentStatsRes {
    pub departments: Vec<DepartmentStat>,
}

// ============================================================================
// EMERGENCY & TRIAGE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegisterEmergencyPatientReq {
    pub patient_id: Option<i64>,
    pub temp_name: Option<String>,
    pub temp_gender: Option<String>,
    pub temp_age: Option<i64>,
    pub arrival_mode: Option<String>,
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmergencyPatientRes {
    pub id: i64,
    pub patient_id: Option<i64>,
    pub display_name: String,
    pub status: String,
    pub assigned_physician_id: Option<i64>,
    pub arrival_mode: Option<String>,
    pub chief_complaint: Option<String>,
    pub arrived_at: String,
    pub latest_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmergencyBoardRes {
    pub patients: Vec<EmergencyPatientRes>,
}

/// Vital signs captured at triage. No range validation is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct VitalsDto {
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub heart_rate: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub spo2: Option<f64>,
    pub gcs: Option<f64>,
    pub pain_score: Option<f64>,
    pub blood_glucose: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TriageReq {
    pub category: Option<String>,
    pub disposition: Option<String>,
    pub vitals: VitalsDto,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TriageAssessmentRes {
    pub id: i64,
    pub emergency_patient_id: i64,
    pub category: String,
    pub disposition: String,
    pub vitals: VitalsDto,
    pub notes: Option<String>,
    pub assessed_by: i64,
    pub assessed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TriageRes {
    pub assessment: TriageAssessmentRes,
    /// Set when a critical/expectant category was routed to OPD.
    pub acuity_mismatch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListTriageRes {
    pub assessments: Vec<TriageAssessmentRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignPhysicianReq {
    pub physician_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinkPatientReq {
    pub patient_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferToOpdReq {
    pub physician_id: i64,
    pub department_id: i64,
    /// `YYYY-MM-DD HH:MM:SS`; defaults to now.
    #[serde(default)]
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct EmergencyOrderReq {
    pub order_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmergencyOrderRes {
    pub id: i64,
    pub emergency_patient_id: i64,
    pub order_type: String,
    pub description: String,
    pub status: String,
    pub ordered_by: i64,
    pub ordered_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListEmergencyOrdersRes {
    pub orders: Vec<EmergencyOrderRes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusReq {
    pub status: String,
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAppointmentReq {
    pub patient_id: i64,
    pub physician_id: i64,
    pub department_id: i64,
    /// `YYYY-MM-DD HH:MM:SS`
    pub scheduled_at: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppointmentRes {
    pub id: i64,
    pub encounter_id: i64,
    pub patient_id: i64,
    pub physician_id: i64,
    pub department_id: i64,
    pub scheduled_at: String,
    pub status: String,
    pub notes: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListAppointmentsRes {
    pub appointments: Vec<AppointmentRes>,
}

// ============================================================================
// LAB ORDERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateLabOrderReq {
    pub lab_test_id: i64,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update. `encounter_id` is deliberately not updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateLabOrderReq {
    pub lab_test_id: Option<i64>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LabOrderRes {
    pub id: i64,
    pub patient_id: i64,
    pub encounter_id: i64,
    pub lab_test_id: i64,
    pub lab_test_name: String,
    pub priority: String,
    pub status: String,
    pub notes: Option<String>,
    pub ordered_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListLabOrdersRes {
    pub lab_orders: Vec<LabOrderRes>,
}

// ============================================================================
// PHARMACY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePrescriptionReq {
    pub drug_id: i64,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: i64,
    pub quantity: i64,
    #[serde(default)]
    pub instant_dispensing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionRes {
    pub id: i64,
    pub patient_id: i64,
    pub encounter_id: i64,
    pub physician_id: i64,
    pub drug_id: i64,
    pub drug_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: i64,
    pub quantity: i64,
    pub instant_dispensing: bool,
    pub stock_reserved: bool,
    pub reserved_until: Option<String>,
    pub dispensed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListPrescriptionsRes {
    pub prescriptions: Vec<PrescriptionRes>,
}

// ============================================================================
// BEDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignBedReq {
    pub encounter_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferBedReq {
    pub bed_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BedAssignmentRes {
    pub id: i64,
    pub bed_id: i64,
    pub encounter_id: i64,
    pub assigned_at: String,
    pub released_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WardOccupancy {
    pub ward_id: i64,
    pub ward_name: String,
    pub total: i64,
    pub occupied: i64,
    pub available: i64,
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BedOccupancyRes {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
    pub wards: Vec<WardOccupancy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileRes {
    pub before: Vec<StatusCount>,
    pub after: Vec<StatusCount>,
    pub beds_changed: i64,
    /// ACTIVE IPD encounters with no active bed assignment.
    pub unassigned_encounters: Vec<i64>,
    /// ACTIVE IPD encounters holding more than one active bed assignment.
    pub multiply_assigned_encounters: Vec<i64>,
    /// Active assignments whose encounter is not an ACTIVE IPD encounter.
    pub stale_assignments: Vec<i64>,
}

// ============================================================================
// BILLING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenBillingAccountReq {
    pub encounter_id: i64,
    #[serde(default)]
    pub branch_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddChargeReq {
    pub description: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyDiscountReq {
    pub amount_cents: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordPaymentReq {
    pub amount_cents: i64,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BillingAccountRes {
    pub id: i64,
    pub patient_id: i64,
    pub encounter_id: i64,
    pub branch_id: Option<i64>,
    pub invoice_number: Option<String>,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub balance_cents: i64,
    pub discount_cents: i64,
    pub discount_reason: Option<String>,
    pub discount_approved_by: Option<i64>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentRes {
    pub id: i64,
    pub billing_account_id: i64,
    pub amount_cents: i64,
    pub method: String,
    pub received_by: i64,
    pub received_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApproverTotal {
    pub user_id: i64,
    pub name: String,
    pub discount_count: i64,
    pub discount_total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodTotal {
    pub method: String,
    pub count: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BillingDashboardRes {
    pub branch_id: Option<i64>,
    pub window_from: String,
    pub window_to: String,
    pub today_revenue_cents: i64,
    pub month_revenue_cents: i64,
    pub previous_month_revenue_cents: i64,
    pub month_growth_rate: f64,
    pub window_revenue_cents: i64,
    pub discount_count: i64,
    pub discount_total_cents: i64,
    pub approver_leaderboard: Vec<ApproverTotal>,
    pub payment_methods: Vec<PaymentMethodTotal>,
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TriageCategorySetting {
    pub category: String,
    pub label: String,
    pub colour: String,
    pub target_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TriageCategorySettingsDto {
    pub categories: Vec<TriageCategorySetting>,
}

// ============================================================================
// CACHE ADMIN
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CacheClearReq {
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheClearRes {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheWarmRes {
    pub warmed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CacheStatsRes {
    pub entries: i64,
    pub expired: i64,
    pub keys: Vec<String>,
}
