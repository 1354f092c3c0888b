//! # API REST
//!
//! REST API implementation for HMS.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - Bearer token authentication
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, server-sent appointment events)
//!
//! Uses `api-shared` for payloads and `hms-core` for every workflow.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod error;
pub mod handlers;

use api_shared::dto;
use axum::routing::{get, post, put};
use axum::Router;
use hms_core::constants::{CACHE_KEY_BED_OCCUPANCY, CACHE_KEY_DEPARTMENT_STATS, CACHE_KEY_DRUGS};
use hms_core::{
    AppointmentService, BedService, BillingService, CacheService, CoreConfig, Database,
    EmergencyService, EncounterService, LabOrderService, MasterDataService, PatientService,
    PharmacyService, SettingsRepository, UserService,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Appointment events buffered per subscriber before it starts lagging.
const APPOINTMENT_EVENT_BUFFER: usize = 256;

/// Application state for the REST API server
///
/// Every service shares one [`Database`] handle; cloning the state is cheap.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub cache: CacheService,
    pub users: UserService,
    pub patients: PatientService,
    pub encounters: EncounterService,
    pub emergency: EmergencyService,
    pub appointments: AppointmentService,
    pub lab_orders: LabOrderService,
    pub pharmacy: PharmacyService,
    pub beds: BedService,
    pub billing: BillingService,
    pub master_data: MasterDataService,
    pub settings: SettingsRepository,
    pub appointment_events: broadcast::Sender<dto::AppointmentRes>,
}

impl AppState {
    pub fn new(db: Database, cfg: Arc<CoreConfig>) -> Self {
        let cache = CacheService::new(db.clone(), cfg.cache_ttl());
        let (appointment_events, _) = broadcast::channel(APPOINTMENT_EVENT_BUFFER);
        Self {
            users: UserService::new(db.clone()),
            patients: PatientService::new(db.clone()),
            encounters: EncounterService::new(db.clone()),
            emergency: EmergencyService::new(db.clone()),
            appointments: AppointmentService::new(db.clone()),
            lab_orders: LabOrderService::new(db.clone()),
            pharmacy: PharmacyService::new(db.clone(), cfg.reservation_window()),
            beds: BedService::new(db.clone(), cache.clone()),
            billing: BillingService::new(db.clone(), cfg.default_branch().clone()),
            master_data: MasterDataService::new(db.clone(), cache.clone()),
            settings: SettingsRepository::new(db),
            cache,
            appointment_events,
            cfg,
        }
    }

    /// Broadcasts a created or updated appointment and drops the department counts it affects.
    pub fn appointment_changed(&self, appointment: &dto::AppointmentRes) {
        if self.appointment_events.send(appointment.clone()).is_err() {
            tracing::debug!(appointment_id = appointment.id, "no appointment event subscribers");
        }
        self.forget(CACHE_KEY_DEPARTMENT_STATS);
    }

    /// Drops cached aggregates after an encounter opens or closes.
    pub fn invalidate_dashboards(&self) {
        self.forget(CACHE_KEY_BED_OCCUPANCY);
        self.forget(CACHE_KEY_DEPARTMENT_STATS);
    }

    /// Drops the drug options, whose available quantities follow stock movements.
    pub fn invalidate_master_drugs(&self) {
        self.forget(CACHE_KEY_DRUGS);
    }

    fn forget(&self, key: &str) {
        if let Err(e) = self.cache.forget(key) {
            tracing::warn!(key, error = %e, "failed to invalidate cache entry");
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::options::departments,
        handlers::options::wards,
        handlers::options::lab_tests,
        handlers::options::drugs,
        handlers::patients::create_patient,
        handlers::patients::list_patients,
        handlers::patients::get_patient,
        handlers::patients::admit,
        handlers::patients::get_encounter,
        handlers::patients::complete_encounter,
        handlers::patients::department_stats,
        handlers::emergency::register,
        handlers::emergency::board,
        handlers::emergency::get_patient,
        handlers::emergency::record_triage,
        handlers::emergency::list_triage,
        handlers::emergency::assign_physician,
        handlers::emergency::link_patient,
        handlers::emergency::transfer_to_opd,
        handlers::emergency::create_order,
        handlers::emergency::list_orders,
        handlers::emergency::update_order_status,
        handlers::appointments::book,
        handlers::appointments::list,
        handlers::appointments::get_appointment,
        handlers::appointments::update_status,
        handlers::appointments::events,
        handlers::orders::create_lab_order,
        handlers::orders::list_lab_orders,
        handlers::orders::get_lab_order,
        handlers::orders::update_lab_order,
        handlers::orders::delete_lab_order,
        handlers::orders::create_prescription,
        handlers::orders::list_prescriptions,
        handlers::orders::dispense,
        handlers::beds::assign,
        handlers::beds::release,
        handlers::beds::transfer,
        handlers::beds::occupancy,
        handlers::beds::reconcile,
        handlers::billing::open_account,
        handlers::billing::get_account,
        handlers::billing::add_charge,
        handlers::billing::apply_discount,
        handlers::billing::record_payment,
        handlers::billing::discharge,
        handlers::billing::dashboard,
        handlers::admin::cache_clear,
        handlers::admin::cache_warm,
        handlers::admin::cache_stats,
        handlers::admin::triage_categories,
        handlers::admin::set_triage_categories,
    ),
    components(schemas(
        dto::HealthRes,
        dto::DepartmentOption,
        dto::WardOption,
        dto::LabTestOption,
        dto::DrugOption,
        dto::CreatePatientReq,
        dto::PatientRes,
        dto::ListPatientsRes,
        dto::AdmitPatientReq,
        dto::EncounterRes,
        dto::DepartmentStat,
        dto::DepartmentStatsRes,
        dto::RegisterEmergencyPatientReq,
        dto::EmergencyPatientRes,
        dto::EmergencyBoardRes,
        dto::VitalsDto,
        dto::TriageReq,
        dto::TriageAssessmentRes,
        dto::TriageRes,
        dto::ListTriageRes,
        dto::AssignPhysicianReq,
        dto::LinkPatientReq,
        dto::TransferToOpdReq,
        dto::EmergencyOrderReq,
        dto::EmergencyOrderRes,
        dto::ListEmergencyOrdersRes,
        dto::UpdateStatusReq,
        dto::CreateAppointmentReq,
        dto::AppointmentRes,
        dto::ListAppointmentsRes,
        dto::CreateLabOrderReq,
        dto::UpdateLabOrderReq,
        dto::LabOrderRes,
        dto::ListLabOrdersRes,
        dto::CreatePrescriptionReq,
        dto::PrescriptionRes,
        dto::ListPrescriptionsRes,
        dto::AssignBedReq,
        dto::TransferBedReq,
        dto::BedAssignmentRes,
        dto::StatusCount,
        dto::WardOccupancy,
        dto::BedOccupancyRes,
        dto::ReconcileRes,
        dto::OpenBillingAccountReq,
        dto::AddChargeReq,
        dto::ApplyDiscountReq,
        dto::RecordPaymentReq,
        dto::BillingAccountRes,
        dto::PaymentRes,
        dto::ApproverTotal,
        dto::PaymentMethodTotal,
        dto::BillingDashboardRes,
        dto::TriageCategorySetting,
        dto::TriageCategorySettingsDto,
        dto::CacheClearReq,
        dto::CacheClearRes,
        dto::CacheWarmRes,
        dto::CacheStatsRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full REST router: `/health` is public, everything else requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    use handlers::{admin, appointments, beds, billing, emergency, options, orders, patients};

    let protected = Router::new()
        .route("/options/departments", get(options::departments))
        .route("/options/wards", get(options::wards))
        .route("/options/lab-tests", get(options::lab_tests))
        .route("/options/drugs", get(options::drugs))
        .route(
            "/patients",
            post(patients::create_patient).get(patients::list_patients),
        )
        .route("/patients/:id", get(patients::get_patient))
        .route("/encounters", post(patients::admit))
        .route("/encounters/:id", get(patients::get_encounter))
        .route("/encounters/:id/complete", post(patients::complete_encounter))
        .route("/dashboard/department-stats", get(patients::department_stats))
        .route("/emergency/patients", post(emergency::register))
        .route("/emergency/board", get(emergency::board))
        .route("/emergency/patients/:id", get(emergency::get_patient))
        .route(
            "/emergency/patients/:id/triage",
            post(emergency::record_triage).get(emergency::list_triage),
        )
        .route("/emergency/patients/:id/assign", post(emergency::assign_physician))
        .route("/emergency/patients/:id/register", post(emergency::link_patient))
        .route(
            "/emergency/patients/:id/transfer-opd",
            post(emergency::transfer_to_opd),
        )
        .route(
            "/emergency/patients/:id/orders",
            post(emergency::create_order).get(emergency::list_orders),
        )
        .route("/emergency/orders/:id/status", put(emergency::update_order_status))
        .route("/appointments", post(appointments::book).get(appointments::list))
        .route("/appointments/events", get(appointments::events))
        .route("/appointments/:id", get(appointments::get_appointment))
        .route("/appointments/:id/status", put(appointments::update_status))
        .route(
            "/appointments/:id/lab-orders",
            post(orders::create_lab_order).get(orders::list_lab_orders),
        )
        .route(
            "/appointments/:id/lab-orders/:order_id",
            get(orders::get_lab_order)
                .put(orders::update_lab_order)
                .delete(orders::delete_lab_order),
        )
        .route(
            "/appointments/:id/prescriptions",
            post(orders::create_prescription).get(orders::list_prescriptions),
        )
        .route("/prescriptions/:id/dispense", post(orders::dispense))
        .route("/beds/:id/assign", post(beds::assign))
        .route("/beds/assignments/:id/release", post(beds::release))
        .route("/beds/assignments/:id/transfer", post(beds::transfer))
        .route("/beds/occupancy", get(beds::occupancy))
        .route("/beds/reconcile", post(beds::reconcile))
        .route("/billing/accounts", post(billing::open_account))
        .route("/billing/accounts/:id", get(billing::get_account))
        .route("/billing/accounts/:id/charges", post(billing::add_charge))
        .route("/billing/accounts/:id/discount", post(billing::apply_discount))
        .route("/billing/accounts/:id/payments", post(billing::record_payment))
        .route("/billing/accounts/:id/discharge", post(billing::discharge))
        .route("/billing/dashboard", get(billing::dashboard))
        .route(
            "/settings/triage-categories",
            get(admin::triage_categories).put(admin::set_triage_categories),
        )
        .route("/admin/cache/clear", post(admin::cache_clear))
        .route("/admin/cache/warm", post(admin::cache_warm))
        .route("/admin/cache/stats", get(admin::cache_stats))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
