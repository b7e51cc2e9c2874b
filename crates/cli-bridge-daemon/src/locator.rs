//! Target process discovery.
//!
//! The target runs under a generic interpreter name, so a name filter
//! alone is far too coarse. Ranking is an explicit ordered rule list
//! evaluated over the full candidate set: a local development bundle
//! outranks a packaged distribution, which outranks a bare name match.
//! Each rule is a pure predicate over the candidate's command line, so
//! the ranking is testable without touching the process table.

use std::path::PathBuf;

use sysinfo::ProcessRefreshKind;
use sysinfo::ProcessesToUpdate;
use sysinfo::System;
use sysinfo::UpdateKind;
use tracing::debug;

use crate::config::BridgeConfig;

/// Priority tier a candidate matched on. Lower tiers are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    /// Command line names the local development bundle.
    LocalBundle,
    /// Command line names a packaged distribution entry point.
    Distribution,
    /// Only the coarse process-name filter matched. Installs old
    /// enough to predate the recognized layouts land here, and they
    /// also predate the control endpoint.
    NameOnly,
}

/// One discovered target. Identity is the pid, which is only
/// meaningful while the OS process is alive; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProcess {
    pub pid: u32,
    pub tier: MatchTier,
    pub launch_dir: Option<PathBuf>,
    /// Set for targets expected to lack a control endpoint entirely.
    pub legacy_protocol: bool,
}

/// Raw material for ranking, decoupled from sysinfo so the rules are
/// testable with literal fixtures.
#[derive(Debug, Clone)]
pub struct CandidateProcess {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LocatorCriteria {
    pub name_filter: String,
    pub bundle_marker: String,
    pub dist_marker: String,
    /// The bridge's own process tree and known helper scripts.
    pub exclude_pids: Vec<u32>,
}

impl LocatorCriteria {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            name_filter: config.process_filter.clone(),
            bundle_marker: config.bundle_marker.clone(),
            dist_marker: config.dist_marker.clone(),
            exclude_pids: Vec::new(),
        }
    }

    pub fn with_exclusions(mut self, pids: Vec<u32>) -> Self {
        self.exclude_pids = pids;
        self
    }
}

/// Rank candidates against the criteria, best first.
///
/// Ties within a tier keep the candidates' input order. That order
/// follows process enumeration, which the OS does not guarantee stable
/// across calls; callers must not rely on tie order between passes.
pub fn rank_candidates(
    candidates: &[CandidateProcess],
    criteria: &LocatorCriteria,
) -> Vec<TargetProcess> {
    const TIERS: [MatchTier; 3] = [
        MatchTier::LocalBundle,
        MatchTier::Distribution,
        MatchTier::NameOnly,
    ];

    let mut ranked = Vec::new();
    let mut taken: Vec<u32> = Vec::new();

    for tier in TIERS {
        for candidate in candidates {
            if criteria.exclude_pids.contains(&candidate.pid) || taken.contains(&candidate.pid) {
                continue;
            }
            if rule_matches(tier, candidate, criteria) {
                taken.push(candidate.pid);
                ranked.push(TargetProcess {
                    pid: candidate.pid,
                    tier,
                    launch_dir: candidate.cwd.clone(),
                    legacy_protocol: tier == MatchTier::NameOnly,
                });
            }
        }
    }

    ranked
}

fn rule_matches(tier: MatchTier, candidate: &CandidateProcess, criteria: &LocatorCriteria) -> bool {
    match tier {
        MatchTier::LocalBundle => candidate.cmdline.contains(&criteria.bundle_marker),
        MatchTier::Distribution => candidate.cmdline.contains(&criteria.dist_marker),
        MatchTier::NameOnly => candidate.name.contains(&criteria.name_filter),
    }
}

/// Snapshot the process table and rank matching targets.
pub fn discover(criteria: &LocatorCriteria) -> Vec<TargetProcess> {
    let refresh = ProcessRefreshKind::nothing()
        .with_cmd(UpdateKind::Always)
        .with_cwd(UpdateKind::Always);
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh);

    let own_tree = own_process_tree(&system);

    let candidates: Vec<CandidateProcess> = system
        .processes()
        .iter()
        .filter(|(pid, _)| !own_tree.contains(&pid.as_u32()))
        .map(|(pid, process)| {
            let cmdline = process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            CandidateProcess {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                cmdline,
                cwd: process.cwd().map(PathBuf::from),
            }
        })
        .filter(|c| {
            c.name.contains(&criteria.name_filter)
                || c.cmdline.contains(&criteria.bundle_marker)
                || c.cmdline.contains(&criteria.dist_marker)
        })
        .collect();

    let ranked = rank_candidates(&candidates, criteria);
    debug!(
        candidates = candidates.len(),
        ranked = ranked.len(),
        "discovery pass"
    );
    ranked
}

/// Own pid plus ancestors, so the bridge never targets itself or the
/// shell that started it.
fn own_process_tree(system: &System) -> Vec<u32> {
    let mut tree = Vec::new();
    let Ok(mut pid) = sysinfo::get_current_pid() else {
        return tree;
    };
    loop {
        tree.push(pid.as_u32());
        match system.process(pid).and_then(|p| p.parent()) {
            Some(parent) if !tree.contains(&parent.as_u32()) => pid = parent,
            _ => break,
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria() -> LocatorCriteria {
        LocatorCriteria {
            name_filter: "node".to_string(),
            bundle_marker: "bundle/gemini.js".to_string(),
            dist_marker: "dist/index.js".to_string(),
            exclude_pids: Vec::new(),
        }
    }

    fn candidate(pid: u32, cmdline: &str) -> CandidateProcess {
        CandidateProcess {
            pid,
            name: "node".to_string(),
            cmdline: cmdline.to_string(),
            cwd: None,
        }
    }

    #[test]
    fn test_local_bundle_outranks_distribution_regardless_of_order() {
        let dist = candidate(100, "node /opt/gemini/dist/index.js");
        let bundle = candidate(200, "node /home/dev/gemini/bundle/gemini.js");

        for candidates in [
            vec![dist.clone(), bundle.clone()],
            vec![bundle.clone(), dist.clone()],
        ] {
            let ranked = rank_candidates(&candidates, &criteria());
            assert_eq!(ranked[0].pid, 200);
            assert_eq!(ranked[0].tier, MatchTier::LocalBundle);
            assert_eq!(ranked[1].pid, 100);
            assert_eq!(ranked[1].tier, MatchTier::Distribution);
        }
    }

    #[test]
    fn test_name_only_match_is_last_and_flagged_legacy() {
        let candidates = vec![
            candidate(1, "node /somewhere/else.js"),
            candidate(2, "node /opt/gemini/dist/index.js"),
        ];
        let ranked = rank_candidates(&candidates, &criteria());
        assert_eq!(ranked[0].pid, 2);
        assert!(!ranked[0].legacy_protocol);
        assert_eq!(ranked[1].pid, 1);
        assert_eq!(ranked[1].tier, MatchTier::NameOnly);
        assert!(ranked[1].legacy_protocol);
    }

    #[test]
    fn test_excluded_pids_never_match() {
        let candidates = vec![candidate(7, "node /home/dev/gemini/bundle/gemini.js")];
        let c = criteria().with_exclusions(vec![7]);
        assert!(rank_candidates(&candidates, &c).is_empty());
    }

    #[test]
    fn test_candidate_matches_only_its_best_tier() {
        // A bundle path also contains "node" in the name; it must not
        // reappear in the name-only tier.
        let candidates = vec![candidate(9, "node /home/dev/gemini/bundle/gemini.js")];
        let ranked = rank_candidates(&candidates, &criteria());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].tier, MatchTier::LocalBundle);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let candidates = vec![CandidateProcess {
            pid: 3,
            name: "bash".to_string(),
            cmdline: "bash -l".to_string(),
            cwd: None,
        }];
        assert!(rank_candidates(&candidates, &criteria()).is_empty());
    }

    #[test]
    fn test_ties_within_a_tier_keep_input_order() {
        let candidates = vec![
            candidate(10, "node /a/dist/index.js"),
            candidate(11, "node /b/dist/index.js"),
        ];
        let ranked = rank_candidates(&candidates, &criteria());
        assert_eq!(ranked[0].pid, 10);
        assert_eq!(ranked[1].pid, 11);
    }
}
