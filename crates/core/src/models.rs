//! Domain enums and the few row types that workflow logic inspects directly.
//!
//! Every enum is stored and transported as its wire string.

use crate::{HmsError, HmsResult};
use chrono::NaiveDateTime;

/// Generates an enum with `as_str`, `FromStr`, `Display` and string serde.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Parses `value`, reporting failures against the request field `field`.
            pub fn parse_field(field: &str, value: &str) -> HmsResult<Self> {
                value.trim().parse::<Self>().map_err(|_| HmsError::InvalidEnum {
                    field: field.into(),
                    value: value.into(),
                })
            }
        }

        impl std::str::FromStr for $name {
            type Err = HmsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(HmsError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(EncounterType {
    Opd => "OPD",
    Ipd => "IPD",
    Emergency => "EMERGENCY",
});

str_enum!(EncounterStatus {
    Active => "ACTIVE",
    Completed => "COMPLETED",
});

str_enum!(BedStatus {
    Available => "available",
    Occupied => "occupied",
    Maintenance => "maintenance",
    Reserved => "reserved",
    OutOfOrder => "out_of_order",
});

str_enum!(TriageCategory {
    Red => "red",
    Yellow => "yellow",
    Green => "green",
    Black => "black",
});

impl TriageCategory {
    /// Board ordering: lower ranks are seen first.
    pub fn severity_rank(&self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Yellow => 1,
            Self::Green => 2,
            Self::Black => 3,
        }
    }

    /// Categories that normally stay in the emergency department.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Red | Self::Black)
    }
}

str_enum!(Disposition {
    Emergency => "emergency",
    Opd => "opd",
});

str_enum!(EmergencyStatus {
    Waiting => "waiting",
    Triaged => "triaged",
    PendingOpd => "pending_opd",
    InTreatment => "in_treatment",
    Admitted => "admitted",
    TransferredToOpd => "transferred_to_opd",
    Discharged => "discharged",
});

str_enum!(EmergencyOrderType {
    Lab => "lab",
    Imaging => "imaging",
    Medication => "medication",
    Procedure => "procedure",
});

str_enum!(EmergencyOrderStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    CheckedIn => "checked_in",
    InConsultation => "in_consultation",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl AppointmentStatus {
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (*self, next),
            (Scheduled, CheckedIn)
                | (Scheduled, Cancelled)
                | (Scheduled, NoShow)
                | (CheckedIn, InConsultation)
                | (CheckedIn, Cancelled)
                | (InConsultation, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }
}

str_enum!(LabOrderPriority {
    Routine => "routine",
    Urgent => "urgent",
    Stat => "stat",
});

str_enum!(LabOrderStatus {
    Ordered => "ordered",
    Collected => "collected",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(BillingStatus {
    Open => "open",
    Closed => "closed",
    Discharged => "discharged",
});

str_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    MobileMoney => "mobile_money",
    Insurance => "insurance",
    BankTransfer => "bank_transfer",
});

str_enum!(UserRole {
    Admin => "admin",
    Doctor => "doctor",
    Nurse => "nurse",
    Cashier => "cashier",
    Pharmacist => "pharmacist",
    Receptionist => "receptionist",
});

str_enum!(ReportType {
    DailyRevenue => "daily_revenue",
    BedOccupancy => "bed_occupancy",
    DiscountSummary => "discount_summary",
});

str_enum!(ReportFrequency {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

/// An authenticated staff member.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Encounter {
    pub id: i64,
    pub patient_id: i64,
    pub encounter_type: EncounterType,
    pub status: EncounterStatus,
    pub department_id: Option<i64>,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl Encounter {
    pub fn is_active_ipd(&self) -> bool {
        self.encounter_type == EncounterType::Ipd && self.status == EncounterStatus::Active
    }
}

/// Parses a stored enum column inside a row mapper.
pub(crate) fn enum_column<T: std::str::FromStr>(
    idx: usize,
    value: &str,
) -> Result<T, rusqlite::Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parses a stored timestamp column inside a row mapper.
pub(crate) fn datetime_column(idx: usize, value: &str) -> Result<NaiveDateTime, rusqlite::Error> {
    crate::db::parse_datetime(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
