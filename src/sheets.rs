//! Order log sink.
//!
//! Relayed orders can be appended to a Google Sheet as one row each. The
//! sink is best-effort: failures are reported to the caller, which logs
//! and moves on.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::SheetConfig;
use crate::error::SheetError;
use crate::relay::action::LogRow;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Somewhere order rows can be appended.
#[async_trait]
pub trait OrderLog: Send + Sync {
    async fn append(&self, row: &LogRow) -> Result<(), SheetError>;
}

/// Appends rows through the Sheets v4 `values:append` endpoint.
pub struct GoogleSheetsLog {
    sheet_id: String,
    range: String,
    access_token: SecretString,
    client: reqwest::Client,
}

impl GoogleSheetsLog {
    pub fn new(config: &SheetConfig) -> Self {
        Self {
            sheet_id: config.sheet_id.clone(),
            range: config.range.clone(),
            access_token: config.access_token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn append_url(&self) -> Result<reqwest::Url, SheetError> {
        let mut url = reqwest::Url::parse(SHEETS_API_BASE)
            .map_err(|e| SheetError::Request(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| SheetError::Request("base url cannot hold a path".into()))?
            .push(&self.sheet_id)
            .push("values")
            .push(&format!("{}:append", self.range));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }
}

/// Request body for a single-row append.
fn append_body(row: &LogRow) -> serde_json::Value {
    serde_json::json!({
        "majorDimension": "ROWS",
        "values": [row.to_cells()],
    })
}

#[async_trait]
impl OrderLog for GoogleSheetsLog {
    async fn append(&self, row: &LogRow) -> Result<(), SheetError> {
        let resp = self
            .client
            .post(self.append_url()?)
            .bearer_auth(self.access_token.expose_secret())
            .json(&append_body(row))
            .send()
            .await
            .map_err(|e| SheetError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SheetError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(sheet_id = %self.sheet_id, "Order row appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> GoogleSheetsLog {
        GoogleSheetsLog::new(&SheetConfig {
            sheet_id: "abc123".into(),
            access_token: SecretString::from("token"),
            range: "Orders!A1".into(),
        })
    }

    #[test]
    fn append_url_encodes_range() {
        let url = sheet().append_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/Orders!A1:append\
             ?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS"
        );
    }

    #[test]
    fn append_url_escapes_spaces_in_sheet_name() {
        let log = GoogleSheetsLog::new(&SheetConfig {
            sheet_id: "abc".into(),
            access_token: SecretString::from("t"),
            range: "Turn Orders!A1".into(),
        });
        let url = log.append_url().unwrap();
        assert!(url.path().ends_with("/values/Turn%20Orders!A1:append"));
    }

    #[test]
    fn body_is_one_row() {
        let row = LogRow {
            timestamp: "now".into(),
            turn: Some(2),
            affiliation: "Crimson Guard".into(),
            author_name: "Jane".into(),
            content: "hold".into(),
            attachment_urls: vec![],
        };
        let body = append_body(&row);
        assert_eq!(body["majorDimension"], "ROWS");
        assert_eq!(
            body["values"],
            serde_json::json!([["now", "2", "Crimson Guard", "Jane", "hold", ""]])
        );
    }
}
