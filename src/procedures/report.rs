//! Structured test reports.

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::error::AppResult;
use crate::measurement::ScreenCapture;
use crate::session::InstrumentSession;

/// Two decimal places, as every report figure is printed.
pub fn format_figure(value: f64) -> String {
    format!("{:.2}", value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestMetrics {
    pub timestamp: DateTime<Local>,
    pub run_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestParameter {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquipmentEntry {
    pub name: String,
    pub make: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

/// One titled table of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    pub legend: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    pub fn new(legend: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            legend: legend.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    /// Cell in `column` of row `row`.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub test_name: String,
    pub metrics: TestMetrics,
    pub parameters: Vec<TestParameter>,
    pub equipment: Vec<EquipmentEntry>,
    pub results: Vec<ResultTable>,
    pub screen_captures: Vec<ScreenCapture>,
}

impl TestReport {
    pub fn table(&self, legend: &str) -> Option<&ResultTable> {
        self.results.iter().find(|t| t.legend == legend)
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Collects report sections while a procedure runs.
pub struct ReportBuilder {
    test_name: String,
    started_at: DateTime<Local>,
    started: Instant,
    parameters: Vec<TestParameter>,
    equipment: Vec<EquipmentEntry>,
    results: Vec<ResultTable>,
    screen_captures: Vec<ScreenCapture>,
}

impl ReportBuilder {
    pub fn start(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            started_at: Local::now(),
            started: Instant::now(),
            parameters: Vec::new(),
            equipment: Vec::new(),
            results: Vec::new(),
            screen_captures: Vec::new(),
        }
    }

    pub fn parameter(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        unit: Option<&str>,
    ) -> &mut Self {
        self.parameters.push(TestParameter {
            name: name.to_string(),
            value: value.into(),
            unit: unit.map(str::to_string),
        });
        self
    }

    /// Record the identity of an instrument taking part in the run.
    pub async fn equipment(&mut self, session: &InstrumentSession) -> AppResult<&mut Self> {
        let identity = session.handle().identify().await?;
        self.equipment.push(EquipmentEntry {
            name: session.name().to_string(),
            make: identity.make,
            model: identity.model,
            serial: identity.serial_number,
            firmware: identity.firmware_version,
        });
        Ok(self)
    }

    pub fn table(&mut self, table: ResultTable) -> &mut Self {
        self.results.push(table);
        self
    }

    pub fn screen_capture(&mut self, capture: ScreenCapture) -> &mut Self {
        self.screen_captures.push(capture);
        self
    }

    pub fn finish(self) -> TestReport {
        TestReport {
            test_name: self.test_name,
            metrics: TestMetrics {
                timestamp: self.started_at,
                run_time_secs: self.started.elapsed().as_secs_f64(),
            },
            parameters: self.parameters,
            equipment: self.equipment,
            results: self.results,
            screen_captures: self.screen_captures,
        }
    }
}
