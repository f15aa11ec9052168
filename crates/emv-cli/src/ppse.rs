//! Combination selection over the PPSE directory

use emv_card::apdu::commands;
use emv_card::Transceiver;
use emv_common::{find_tag, parse_tlvs, tags, TlvMap};
use emv_entry_point::{
    ApplicationSelector, Candidate, Outcome, PreprocessedApplication, ProcessingError, SelectedApplication,
};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// One ADF advertised in the PPSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub aid: Vec<u8>,
    pub priority: Option<u8>,
}

/// Selects candidates in priority order after a SELECT PPSE
#[derive(Debug, Default)]
pub struct PpseSelector {
    candidates: VecDeque<Candidate>,
}

impl PpseSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationSelector for PpseSelector {
    fn init(
        &mut self,
        apps: &[PreprocessedApplication],
        transceiver: &dyn Transceiver,
    ) -> Result<Option<Outcome>, ProcessingError> {
        self.candidates.clear();

        let response = commands::select_ppse().send(transceiver)?;
        if !response.is_success() {
            warn!(sw = %response.sw, "PPSE not available");
            return Ok(None);
        }

        let entries = directory_entries(&response.data)?;
        debug!(entries = entries.len(), "PPSE directory read");
        self.candidates = build_candidates(apps, &entries).into();
        info!(candidates = self.candidates.len(), "Candidate list built");
        Ok(None)
    }

    fn select(&mut self, transceiver: &dyn Transceiver) -> Result<Option<SelectedApplication>, ProcessingError> {
        while let Some(candidate) = self.candidates.pop_front() {
            let response = commands::select(&candidate.aid).send(transceiver)?;
            if !response.is_success() {
                debug!(aid = %hex::encode_upper(&candidate.aid), sw = %response.sw, "SELECT rejected");
                continue;
            }

            let fci = find_tag(&response.data, &tags::FCI_TEMPLATE.to_bytes())
                .ok_or_else(|| ProcessingError::MalformedData("FCI template missing".into()))?;
            return Ok(Some(SelectedApplication {
                candidate,
                fci: TlvMap::parse(fci)?,
            }));
        }
        Ok(None)
    }
}

/// Directory entries of a PPSE FCI (6F / A5 / BF0C / 61)
pub fn directory_entries(response: &[u8]) -> Result<Vec<DirectoryEntry>, ProcessingError> {
    let fci = find_tag(response, &tags::FCI_TEMPLATE.to_bytes())
        .ok_or_else(|| ProcessingError::MalformedData("FCI template missing".into()))?;
    let Some(proprietary) = find_tag(fci, &tags::FCI_PROPRIETARY_TEMPLATE.to_bytes()) else {
        return Ok(Vec::new());
    };
    let Some(directory) = find_tag(proprietary, &tags::FCI_ISSUER_DISCRETIONARY_DATA.to_bytes()) else {
        return Ok(Vec::new());
    };

    let mut ret = Vec::new();
    for entry in parse_tlvs(directory)? {
        if entry.tag() != tags::DIRECTORY_ENTRY {
            continue;
        }
        let Some(aid) = find_tag(entry.value(), &tags::APPLICATION_IDENTIFIER.to_bytes()) else {
            warn!("Directory entry without ADF name");
            continue;
        };
        let priority = find_tag(entry.value(), &tags::APPLICATION_PRIORITY_INDICATOR.to_bytes())
            .and_then(|p| p.first())
            .map(|p| p & 0x0F)
            .filter(|p| *p != 0);
        ret.push(DirectoryEntry {
            aid: aid.to_vec(),
            priority,
        });
    }
    Ok(ret)
}

/// Pair directory entries with the pre-processed applications they extend
///
/// Applications for which contactless is not allowed are skipped. The
/// result is ordered by priority, entries without one last.
pub fn build_candidates(apps: &[PreprocessedApplication], entries: &[DirectoryEntry]) -> Vec<Candidate> {
    let mut ret: Vec<Candidate> = entries
        .iter()
        .flat_map(|entry| {
            apps.iter()
                .filter(|app| !app.indicators.is_contactless_application_not_allowed())
                .filter(move |app| {
                    hex::decode(app.application_id())
                        .map(|aid| entry.aid.starts_with(&aid))
                        .unwrap_or(false)
                })
                .map(move |app| Candidate {
                    preprocessed: app.clone(),
                    aid: entry.aid.clone(),
                    final_kernel_type: app.kernel_type,
                    priority: entry.priority,
                })
        })
        .collect();

    ret.sort_by_key(|c| c.priority.unwrap_or(u8::MAX));
    ret
}
