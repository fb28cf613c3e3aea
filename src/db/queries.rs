use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Appointment, Business, CallSession, SlotState, Stage};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Businesses ──

/// Look up the business answering on the dialed number, creating a
/// placeholder row the first time an unknown number receives a call.
pub fn find_or_create_business(conn: &Connection, phone_number: &str) -> anyhow::Result<Business> {
    let existing = conn
        .query_row(
            "SELECT id, name, phone_number FROM businesses WHERE phone_number = ?1",
            [phone_number],
            |row| {
                Ok(Business {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    phone_number: row.get(2)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;

    if let Some(business) = existing {
        return Ok(business);
    }

    conn.execute(
        "INSERT INTO businesses (name, phone_number) VALUES (?1, ?2)",
        params!["Default Business", phone_number],
    )?;

    Ok(Business {
        id: conn.last_insert_rowid(),
        name: "Default Business".to_string(),
        phone_number: phone_number.to_string(),
    })
}

// ── Call sessions ──

pub fn get_call_session(conn: &Connection, call_sid: &str) -> anyhow::Result<Option<CallSession>> {
    let result = conn.query_row(
        "SELECT call_sid, business_id, state, stage, created_at FROM call_sessions WHERE call_sid = ?1",
        [call_sid],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    );

    match result {
        Ok((call_sid, business_id, state_json, stage_str, created_at_str)) => {
            let state: SlotState = serde_json::from_str(&state_json).unwrap_or_default();
            let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT)
                .unwrap_or_else(|_| Utc::now().naive_utc());

            Ok(Some(CallSession {
                call_sid,
                business_id,
                state,
                stage: Stage::parse(&stage_str),
                created_at,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_call_session(conn: &Connection, session: &CallSession) -> anyhow::Result<()> {
    let state_json = serde_json::to_string(&session.state)?;

    conn.execute(
        "INSERT INTO call_sessions (call_sid, business_id, state, stage, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(call_sid) DO UPDATE SET state = ?3, stage = ?4",
        params![
            session.call_sid,
            session.business_id,
            state_json,
            session.stage.as_str(),
            session.created_at.format(DATETIME_FMT).to_string(),
        ],
    )?;

    Ok(())
}

// ── Appointments ──

pub fn create_appointment(conn: &Connection, appt: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, business_id, customer_name, service_type, date_time_str, phone_number, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            appt.id,
            appt.business_id,
            appt.customer_name,
            appt.service_type,
            appt.date_time_str,
            appt.phone_number,
            appt.notes,
            appt.created_at.format(DATETIME_FMT).to_string(),
        ],
    )?;

    Ok(())
}

pub fn list_appointments(conn: &Connection) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(
        "SELECT id, business_id, customer_name, service_type, date_time_str, phone_number, notes, created_at
         FROM appointments ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut appointments = Vec::new();
    for row in rows {
        let (id, business_id, customer_name, service_type, date_time_str, phone_number, notes, created_at_str) =
            row?;
        let created_at = NaiveDateTime::parse_from_str(&created_at_str, DATETIME_FMT)
            .unwrap_or_else(|_| Utc::now().naive_utc());

        appointments.push(Appointment {
            id,
            business_id,
            customer_name,
            service_type,
            date_time_str,
            phone_number,
            notes,
            created_at,
        });
    }

    Ok(appointments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    #[test]
    fn test_find_or_create_business_is_idempotent() {
        let conn = test_conn();
        let a = find_or_create_business(&conn, "+15551234567").unwrap();
        let b = find_or_create_business(&conn, "+15551234567").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_session_round_trip_preserves_slots() {
        let conn = test_conn();
        let business = find_or_create_business(&conn, "+15551234567").unwrap();

        let mut session = CallSession {
            call_sid: "CA123".to_string(),
            business_id: business.id,
            state: SlotState {
                name: Some("Alex".to_string()),
                ..Default::default()
            },
            stage: Stage::AskService,
            created_at: Utc::now().naive_utc(),
        };
        save_call_session(&conn, &session).unwrap();

        session.state.service_type = Some("haircut".to_string());
        session.stage = Stage::AskDateTime;
        save_call_session(&conn, &session).unwrap();

        let loaded = get_call_session(&conn, "CA123").unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::AskDateTime);
        assert_eq!(loaded.state.name.as_deref(), Some("Alex"));
        assert_eq!(loaded.state.service_type.as_deref(), Some("haircut"));
    }

    #[test]
    fn test_unknown_session_is_none() {
        let conn = test_conn();
        assert!(get_call_session(&conn, "CA_missing").unwrap().is_none());
    }

    #[test]
    fn test_create_and_list_appointments() {
        let conn = test_conn();
        let business = find_or_create_business(&conn, "+15551234567").unwrap();

        let appt = Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business.id,
            customer_name: "Alex".to_string(),
            service_type: "haircut".to_string(),
            date_time_str: "Friday 3pm".to_string(),
            phone_number: "555-1234".to_string(),
            notes: None,
            created_at: Utc::now().naive_utc(),
        };
        create_appointment(&conn, &appt).unwrap();

        let listed = list_appointments(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].customer_name, "Alex");
    }
}
