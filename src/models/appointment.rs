use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A business reachable through one Twilio number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
}

/// A confirmed booking, written once per completed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub business_id: i64,
    pub customer_name: String,
    pub service_type: String,
    pub date_time_str: String,
    pub phone_number: String,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}
