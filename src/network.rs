// Outbound network ledger and offline-mode enforcement (spec §6
// `/network/status`, `/network/privacy-report`, Testable Property 6: zero
// outbound requests while `offline_mode` is on). Every call that wants to
// leave the machine — currently just model weight downloads — must go
// through `guarded_get`, so the ledger can never miss a request the engine
// actually made.

use crate::config::Settings;
use crate::error::{EngineError, Result};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatus {
    pub offline_mode: bool,
    pub total_requests: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacyReportEntry {
    pub purpose: String,
    pub request_count: i64,
    pub succeeded_count: i64,
}

pub fn status(conn: &Connection, settings: &Settings) -> Result<NetworkStatus> {
    Ok(NetworkStatus {
        offline_mode: settings.offline_mode,
        total_requests: crate::store::schema::count_network_requests(conn)?,
    })
}

/// Every distinct purpose the engine has ever made outbound requests for,
/// with success/failure counts — the basis of the privacy report a user
/// reviews to confirm nothing unexpected phoned home.
pub fn privacy_report(conn: &Connection) -> Result<Vec<PrivacyReportEntry>> {
    let mut stmt = conn.prepare(
        "SELECT purpose, COUNT(*), SUM(succeeded) FROM network_requests GROUP BY purpose ORDER BY purpose",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PrivacyReportEntry {
            purpose: row.get(0)?,
            request_count: row.get(1)?,
            succeeded_count: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Download `url` for `purpose` (currently only "model_weights"), recording
/// every request the engine actually makes. Refuses outright when
/// `offline_mode` is set, without ever touching the network *or* the
/// ledger — a blocked attempt never left the machine, so it must not count
/// toward the ledger either (spec Testable Property 6: the ledger's
/// counters stay at 0 for an offline session).
pub async fn guarded_get(conn: &Connection, settings: &Settings, purpose: &str, url: &str) -> Result<bytes::Bytes> {
    if settings.offline_mode {
        return Err(EngineError::OfflineBlocked(url.to_string()));
    }

    let result = reqwest::get(url).await;
    match result {
        Ok(response) if response.status().is_success() => {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| EngineError::Other(format!("reading response body: {}", e)))?;
            crate::store::schema::record_network_request(conn, purpose, url, true)?;
            Ok(bytes)
        }
        Ok(response) => {
            crate::store::schema::record_network_request(conn, purpose, url, false)?;
            Err(EngineError::Other(format!("request to {} failed with status {}", url, response.status())))
        }
        Err(e) => {
            crate::store::schema::record_network_request(conn, purpose, url, false)?;
            Err(EngineError::Other(format!("request to {} failed: {}", url, e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    #[tokio::test]
    async fn offline_mode_blocks_without_touching_the_ledger() {
        let conn = open_memory().unwrap();
        let mut settings = Settings::default();
        settings.offline_mode = true;

        let result = guarded_get(&conn, &settings, "model_weights", "https://example.invalid/model.bin").await;
        assert!(matches!(result, Err(EngineError::OfflineBlocked(_))));

        let report = privacy_report(&conn).unwrap();
        assert!(report.is_empty());
        let status = status(&conn, &settings).unwrap();
        assert_eq!(status.total_requests, 0);
    }

    #[test]
    fn status_reports_zero_requests_for_a_fresh_store() {
        let conn = open_memory().unwrap();
        let settings = Settings::default();
        let status = status(&conn, &settings).unwrap();
        assert_eq!(status.total_requests, 0);
        assert!(!status.offline_mode);
    }
}
