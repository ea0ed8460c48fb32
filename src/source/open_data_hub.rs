use crate::source::error::SourceError;
use crate::source::{MeasurementSource, StationSource};
use crate::types::raw_record::RawRecord;
use crate::types::station::{Coordinate, ParkingStation};
use bon::bon;
use chrono::NaiveDate;
use log::{info, warn};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://mobility.api.opendatahub.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const STATION_ORIGIN: &str = "FAMAS";
const MEASUREMENT_SELECT: &str = "mvalue,mvalidtime,tname";
const STATION_SELECT: &str = "scode,sname,smetadata.municipality,scoordinate";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StationDto {
    scode: Option<serde_json::Value>,
    sname: Option<String>,
    #[serde(rename = "smetadata.municipality")]
    municipality: Option<String>,
    scoordinate: Option<CoordinateDto>,
}

#[derive(Debug, Deserialize)]
struct CoordinateDto {
    x: Option<f64>,
    y: Option<f64>,
}

impl StationDto {
    /// `None` when the code or a coordinate is missing.
    fn into_station(self) -> Option<ParkingStation> {
        let code = match self.scode? {
            serde_json::Value::String(code) => code,
            serde_json::Value::Number(code) => code.to_string(),
            _ => return None,
        };
        let coordinate = self.scoordinate?;
        let location = Coordinate {
            latitude: coordinate.y?,
            longitude: coordinate.x?,
        };
        Some(ParkingStation {
            name: self.sname.unwrap_or_else(|| code.clone()),
            code,
            municipality: self.municipality,
            location,
        })
    }
}

/// Blocking client for the South Tyrol Open Data Hub mobility API.
#[derive(Debug, Clone)]
pub struct OpenDataHubClient {
    client: Client,
    base_url: String,
}

#[bon]
impl OpenDataHubClient {
    #[builder]
    pub fn new(base_url: Option<String>, timeout_secs: Option<u64>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .build()
            .map_err(SourceError::ClientBuild)?;
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn measurements_url(&self, start_date: NaiveDate, end_date: NaiveDate) -> String {
        // The upper bound is exclusive upstream, so ask for the day after `end_date`.
        let end_exclusive = end_date.succ_opt().unwrap_or(end_date);
        format!(
            "{}/v2/flat/ParkingStation/free,occupied/{}/{}",
            self.base_url,
            start_date.format("%Y-%m-%d"),
            end_exclusive.format("%Y-%m-%d")
        )
    }

    fn stations_url(&self) -> String {
        format!("{}/v2/flat/ParkingStation", self.base_url)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| SourceError::NetworkRequest(url.to_string(), e))?;
        let response = check_status(url, response)?;
        response
            .json::<ApiResponse<T>>()
            .map_err(|e| SourceError::ResponseDecode(url.to_string(), e))
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, SourceError> {
    match response.error_for_status() {
        Ok(response) => Ok(response),
        Err(e) => {
            warn!("Request to {} failed: {}", url, e);
            match e.status() {
                Some(status) => Err(SourceError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                }),
                None => Err(SourceError::NetworkRequest(url.to_string(), e)),
            }
        }
    }
}

fn station_filter(station_code: &str) -> String {
    format!("and(sorigin.eq.{STATION_ORIGIN},scode.eq.\"{station_code}\")")
}

impl MeasurementSource for OpenDataHubClient {
    fn fetch(
        &self,
        station_code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let url = self.measurements_url(start_date, end_date);
        let query = [
            ("where", station_filter(station_code)),
            ("select", MEASUREMENT_SELECT.to_string()),
            ("limit", "-1".to_string()),
        ];
        let response: ApiResponse<RawRecord> = self.get_json(&url, &query)?;
        info!(
            "Fetched {} raw records for station {} ({} to {})",
            response.data.len(),
            station_code,
            start_date,
            end_date
        );
        Ok(response.data)
    }
}

impl StationSource for OpenDataHubClient {
    fn fetch_stations(&self) -> Result<Vec<ParkingStation>, SourceError> {
        let url = self.stations_url();
        let query = [
            ("where", format!("sorigin.eq.{STATION_ORIGIN}")),
            ("select", STATION_SELECT.to_string()),
            ("limit", "-1".to_string()),
        ];
        let response: ApiResponse<StationDto> = self.get_json(&url, &query)?;
        let total = response.data.len();
        let stations: Vec<ParkingStation> = response
            .data
            .into_iter()
            .filter_map(StationDto::into_station)
            .collect();
        if stations.len() < total {
            warn!(
                "Dropped {} stations without a code or coordinates",
                total - stations.len()
            );
        }
        info!("Fetched {} parking stations", stations.len());
        Ok(stations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_body_decodes_into_raw_records() -> Result<(), Box<dyn std::error::Error>> {
        let body = r#"{
            "offset": 0,
            "data": [
                {"mvalidtime": "2024-05-01 10:00:00.000+0200", "tname": "free", "mvalue": 42},
                {"mvalidtime": "2024-05-01 10:00:00.000+0200", "tname": "occupied", "mvalue": 58.0},
                {"tname": "free"}
            ]
        }"#;
        let response: ApiResponse<RawRecord> = serde_json::from_str(body)?;

        assert_eq!(response.data.len(), 3);
        assert_eq!(
            response.data[0],
            RawRecord::new("2024-05-01 10:00:00.000+0200", "free", 42.0)
        );
        assert_eq!(response.data[2].timestamp, None);
        assert_eq!(response.data[2].value, None);

        let empty: ApiResponse<RawRecord> = serde_json::from_str("{}")?;
        assert!(empty.data.is_empty());
        Ok(())
    }

    #[test]
    fn test_station_dtos_skip_entries_without_coordinates() -> Result<(), Box<dyn std::error::Error>>
    {
        let body = r#"{"data": [
            {"scode": "103", "sname": "P03 - Piazza Walther", "smetadata.municipality": "Bolzano - Bozen",
             "scoordinate": {"x": 11.3547, "y": 46.4983, "srid": 4326}},
            {"scode": 108, "scoordinate": {"x": 11.33, "y": 46.49}},
            {"scode": "999", "sname": "No location"},
            {"scode": "998", "scoordinate": {"x": 11.0}}
        ]}"#;
        let response: ApiResponse<StationDto> = serde_json::from_str(body)?;
        let stations: Vec<ParkingStation> = response
            .data
            .into_iter()
            .filter_map(StationDto::into_station)
            .collect();

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].code, "103");
        assert_eq!(stations[0].municipality.as_deref(), Some("Bolzano - Bozen"));
        assert_eq!(stations[0].location.latitude, 46.4983);
        assert_eq!(stations[0].location.longitude, 11.3547);
        assert_eq!(stations[1].code, "108");
        assert_eq!(stations[1].name, "108");
        Ok(())
    }

    #[test]
    fn test_urls_and_filters() -> Result<(), Box<dyn std::error::Error>> {
        let client = OpenDataHubClient::builder()
            .base_url("http://localhost:8080/".to_string())
            .build()?;
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();

        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.measurements_url(start, end),
            "http://localhost:8080/v2/flat/ParkingStation/free,occupied/2024-05-01/2024-06-01"
        );
        assert_eq!(station_filter("103"), r#"and(sorigin.eq.FAMAS,scode.eq."103")"#);
        Ok(())
    }
}
