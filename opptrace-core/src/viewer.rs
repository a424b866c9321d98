//! Run selection for trace viewers
//!
//! [`RunPicker`] owns the run list of one automation or script and the
//! currently selected run. It handles the two lifecycle problems a viewer
//! runs into:
//!
//! - **Stale selection**: the selected run vanished from a refreshed list
//!   (purged by retention). The selection is cleared and a
//!   [`Notice::StaleSelection`] is returned for the caller to show. Another
//!   run is never picked in its place.
//! - **Late results**: a trace load finishes after the selection moved on.
//!   Every load carries a [`LoadTicket`]; [`RunPicker::accept`] drops results
//!   whose ticket is no longer current.

use crate::error::{Error, Result};
use crate::trace::{load_trace, load_traces};
use crate::transport::SocketTransport;
use crate::types::{AutomationTrace, AutomationTraceExtended, TraceDomain};

/// Something the caller should tell the user about after a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The selected run is gone from the run list
    StaleSelection { run_id: String },
    /// The item has no runs at all
    NoRuns,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::StaleSelection { run_id } => format!(
                "Run {} is no longer available. It may have been removed because the trace limit was reached.",
                run_id
            ),
            Notice::NoRuns => "No traces found".to_string(),
        }
    }
}

/// Identifies the selection a load was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

/// A pending trace load, detached from the picker so the selection can
/// change while it runs
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub domain: TraceDomain,
    pub item_id: String,
    pub run_id: String,
    ticket: LoadTicket,
}

impl LoadRequest {
    pub async fn execute(self, transport: &dyn SocketTransport) -> Result<LoadedTrace> {
        let trace = load_trace(transport, self.domain, &self.item_id, &self.run_id).await?;
        Ok(LoadedTrace {
            trace,
            ticket: self.ticket,
        })
    }
}

/// A loaded trace tagged with the selection it was requested for
#[derive(Debug, Clone)]
pub struct LoadedTrace {
    pub trace: AutomationTraceExtended,
    ticket: LoadTicket,
}

/// Run list and selection for one item
#[derive(Debug)]
pub struct RunPicker {
    domain: TraceDomain,
    item_id: String,
    /// Newest first
    runs: Vec<AutomationTrace>,
    selected: Option<String>,
    generation: u64,
}

impl RunPicker {
    pub fn new(domain: TraceDomain, item_id: impl Into<String>) -> Self {
        Self {
            domain,
            item_id: item_id.into(),
            runs: Vec::new(),
            selected: None,
            generation: 0,
        }
    }

    /// Start with an explicitly requested run (e.g. from a deep link).
    ///
    /// The run is checked against the list on the next [`Self::refresh`].
    pub fn with_selection(mut self, run_id: impl Into<String>) -> Self {
        self.selected = Some(run_id.into());
        self
    }

    pub fn domain(&self) -> TraceDomain {
        self.domain
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Runs, newest first
    pub fn runs(&self) -> &[AutomationTrace] {
        &self.runs
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_run(&self) -> Option<&AutomationTrace> {
        let selected = self.selected.as_deref()?;
        self.runs.iter().find(|run| run.run_id == selected)
    }

    /// Reload the run list.
    ///
    /// Selects the newest run if nothing is selected. Clears the selection
    /// and reports [`Notice::StaleSelection`] if the selected run is gone.
    pub async fn refresh(&mut self, transport: &dyn SocketTransport) -> Result<Option<Notice>> {
        let mut runs = load_traces(transport, self.domain, &self.item_id).await?;
        runs.reverse();
        Ok(self.apply_runs(runs))
    }

    fn apply_runs(&mut self, runs: Vec<AutomationTrace>) -> Option<Notice> {
        self.runs = runs;

        if let Some(selected) = self.selected.clone() {
            if self.runs.iter().any(|run| run.run_id == selected) {
                return None;
            }
            tracing::warn!(
                domain = %self.domain,
                item_id = %self.item_id,
                run_id = %selected,
                "Selected run no longer in trace list"
            );
            self.clear_selection();
            return Some(Notice::StaleSelection { run_id: selected });
        }

        match self.runs.first() {
            Some(newest) => {
                let run_id = newest.run_id.clone();
                self.set_selection(Some(run_id));
                None
            }
            None => Some(Notice::NoRuns),
        }
    }

    /// Select a run from the current list.
    pub fn select(&mut self, run_id: &str) -> Result<()> {
        if !self.runs.iter().any(|run| run.run_id == run_id) {
            return Err(Error::RunNotFound(run_id.to_string()));
        }
        self.set_selection(Some(run_id.to_string()));
        Ok(())
    }

    /// Select the newest run.
    pub fn select_newest(&mut self) -> Option<&str> {
        let run_id = self.runs.first()?.run_id.clone();
        self.set_selection(Some(run_id));
        self.selected()
    }

    /// Step to the next older run, if any.
    pub fn select_older(&mut self) -> Option<&str> {
        self.select_relative(1)
    }

    /// Step to the next newer run, if any.
    pub fn select_newer(&mut self) -> Option<&str> {
        self.select_relative(-1)
    }

    fn select_relative(&mut self, offset: isize) -> Option<&str> {
        let selected = self.selected.as_deref()?;
        let index = self.runs.iter().position(|run| run.run_id == selected)?;
        let target = index.checked_add_signed(offset)?;
        let run_id = self.runs.get(target)?.run_id.clone();
        self.set_selection(Some(run_id));
        self.selected()
    }

    pub fn clear_selection(&mut self) {
        self.set_selection(None);
    }

    fn set_selection(&mut self, run_id: Option<String>) {
        if self.selected != run_id {
            self.generation += 1;
        }
        self.selected = run_id;
    }

    /// Ticket for the current selection.
    pub fn ticket(&self) -> LoadTicket {
        LoadTicket {
            generation: self.generation,
        }
    }

    /// True if a result for `ticket` still matches the selection.
    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Build a load for the selected run, `None` if nothing is selected.
    pub fn load_request(&self) -> Option<LoadRequest> {
        Some(LoadRequest {
            domain: self.domain,
            item_id: self.item_id.clone(),
            run_id: self.selected.clone()?,
            ticket: self.ticket(),
        })
    }

    /// Keep a loaded trace only if the selection has not moved on.
    pub fn accept(&self, loaded: LoadedTrace) -> Option<AutomationTraceExtended> {
        if self.is_current(loaded.ticket) {
            Some(loaded.trace)
        } else {
            tracing::debug!(
                run_id = %loaded.trace.summary.run_id,
                "Discarding trace loaded for a previous selection"
            );
            None
        }
    }

    /// Load the selected run and accept it in one go.
    pub async fn load_selected(
        &self,
        transport: &dyn SocketTransport,
    ) -> Result<Option<AutomationTraceExtended>> {
        let Some(request) = self.load_request() else {
            return Ok(None);
        };
        let loaded = request.execute(transport).await?;
        Ok(self.accept(loaded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(run_id: &str) -> AutomationTrace {
        serde_json::from_value(json!({
            "domain": "automation",
            "item_id": "a1",
            "run_id": run_id,
            "state": "stopped",
            "script_execution": "finished",
            "timestamp": {"start": "2021-01-01T00:00:00Z", "finish": "2021-01-01T00:00:01Z"}
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_to_newest() {
        let mut picker = RunPicker::new(TraceDomain::Automation, "a1");
        let mut runs = vec![run("r1"), run("r2"), run("r3")];
        runs.reverse();
        assert_eq!(picker.apply_runs(runs), None);
        assert_eq!(picker.selected(), Some("r3"));
    }

    #[test]
    fn test_stale_selection_is_cleared() {
        let mut picker = RunPicker::new(TraceDomain::Automation, "a1").with_selection("r1");
        let notice = picker.apply_runs(vec![run("r3"), run("r2")]);
        assert_eq!(
            notice,
            Some(Notice::StaleSelection {
                run_id: "r1".to_string()
            })
        );
        assert_eq!(picker.selected(), None);
        assert!(notice.unwrap().message().contains("r1"));
    }

    #[test]
    fn test_no_runs() {
        let mut picker = RunPicker::new(TraceDomain::Script, "s1");
        assert_eq!(picker.apply_runs(vec![]), Some(Notice::NoRuns));
        assert!(picker.load_request().is_none());
    }

    #[test]
    fn test_navigation() {
        let mut picker = RunPicker::new(TraceDomain::Automation, "a1");
        picker.apply_runs(vec![run("r3"), run("r2"), run("r1")]);
        assert_eq!(picker.select_older(), Some("r2"));
        assert_eq!(picker.select_older(), Some("r1"));
        assert_eq!(picker.select_older(), None);
        assert_eq!(picker.selected(), Some("r1"));
        assert_eq!(picker.select_newer(), Some("r2"));
        assert_eq!(picker.select_newest(), Some("r3"));
        assert_eq!(picker.select_newer(), None);
    }

    #[test]
    fn test_select_unknown_run() {
        let mut picker = RunPicker::new(TraceDomain::Automation, "a1");
        picker.apply_runs(vec![run("r1")]);
        assert!(matches!(picker.select("nope"), Err(Error::RunNotFound(_))));
        assert_eq!(picker.selected(), Some("r1"));
    }

    #[test]
    fn test_ticket_invalidated_by_selection_change() {
        let mut picker = RunPicker::new(TraceDomain::Automation, "a1");
        picker.apply_runs(vec![run("r2"), run("r1")]);
        let ticket = picker.ticket();
        assert!(picker.is_current(ticket));

        // Reselecting the same run keeps the ticket valid
        picker.select("r2").unwrap();
        assert!(picker.is_current(ticket));

        picker.select("r1").unwrap();
        assert!(!picker.is_current(ticket));
    }
}
