use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{CaseStatus, Priority, Role};

/// Errors raised while loading or checking a lifecycle policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy file could not be read: {0}")]
    Io(#[from] std::io::Error),
    #[error("policy document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("terminal status {0} must not have outgoing edges")]
    TerminalHasEdges(CaseStatus),
    #[error("status {0} is not part of the case lifecycle")]
    NotALifecycleStage(CaseStatus),
    #[error("edge rule {from} -> {to} does not match a permitted edge")]
    UnknownEdge { from: CaseStatus, to: CaseStatus },
    #[error("SLA table is missing base days for {0}")]
    MissingBaseDays(CaseStatus),
    #[error("base days for {status} must not exceed {max} (found {days})", max = MAX_BASE_DAYS)]
    BaseDaysOutOfRange { status: CaseStatus, days: u32 },
    #[error(
        "priority multiplier for {priority:?} must be within (0, {max}] (found {value})",
        max = MAX_MULTIPLIER
    )]
    InvalidMultiplier { priority: Priority, value: f64 },
    #[error("priority multiplier for {more_severe:?} must not exceed the one for {less_severe:?}")]
    MultipliersOutOfOrder {
        more_severe: Priority,
        less_severe: Priority,
    },
    #[error(
        "{sla} target must not exceed {max} business days (found {days})",
        max = MAX_SIGNAL_TARGET_DAYS
    )]
    SignalTargetOutOfRange { sla: &'static str, days: u32 },
    #[error("at-risk ratio must be within (0, 1] (found {0})")]
    InvalidAtRiskRatio(f64),
}

/// Upper bound for a status' calendar grace period.
pub const MAX_BASE_DAYS: u32 = 3_650;
pub const MAX_MULTIPLIER: f64 = 10.0;
/// Upper bound for any business-day target tracked by the signal detector.
pub const MAX_SIGNAL_TARGET_DAYS: u32 = 365;

/// Restrictions attached to a single directed edge of the lifecycle graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRule {
    pub from: CaseStatus,
    pub to: CaseStatus,
    /// `None` leaves the edge open to every role.
    #[serde(default)]
    pub allowed_roles: Option<BTreeSet<Role>>,
    #[serde(default)]
    pub requires_documentation: bool,
    #[serde(default)]
    pub blocks_on_critical_signals: bool,
}

impl EdgeRule {
    pub fn permits_role(&self, role: Role) -> bool {
        self.allowed_roles
            .as_ref()
            .map(|roles| roles.contains(&role))
            .unwrap_or(true)
    }
}

/// Calendar-day SLA table used by the deadline calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaTable {
    pub base_days: BTreeMap<CaseStatus, u32>,
    pub priority_multipliers: BTreeMap<Priority, f64>,
}

impl SlaTable {
    pub fn standard() -> Self {
        let base_days = BTreeMap::from([
            (CaseStatus::Submitted, 2),
            (CaseStatus::UnderReview, 5),
            (CaseStatus::Assigned, 3),
            (CaseStatus::Investigation, 10),
            (CaseStatus::PendingDocumentation, 7),
            (CaseStatus::Resolved, 30),
            (CaseStatus::Rejected, 30),
            (CaseStatus::Closed, 0),
        ]);
        let priority_multipliers = BTreeMap::from([
            (Priority::Critical, 0.5),
            (Priority::High, 0.75),
            (Priority::Medium, 1.0),
            (Priority::Low, 1.5),
        ]);

        Self {
            base_days,
            priority_multipliers,
        }
    }

    /// Statuses outside the table have no grace period.
    pub fn base_days_for(&self, status: CaseStatus) -> u32 {
        self.base_days.get(&status).copied().unwrap_or(0)
    }

    pub fn multiplier_for(&self, priority: Priority) -> f64 {
        self.priority_multipliers
            .get(&priority)
            .copied()
            .unwrap_or(1.0)
    }
}

/// Business-day targets for the SLAs tracked by the signal detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSlaTargets {
    pub acknowledgment_days: u32,
    pub first_response_days: u32,
    pub investigation_days: u32,
    /// Fraction of the target after which an open SLA counts as at risk.
    pub at_risk_ratio: f64,
}

impl Default for SignalSlaTargets {
    fn default() -> Self {
        Self {
            acknowledgment_days: 2,
            first_response_days: 5,
            investigation_days: 30,
            at_risk_ratio: 0.8,
        }
    }
}

/// Immutable lifecycle configuration injected into the validator, calculator and detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub edges: BTreeMap<CaseStatus, BTreeSet<CaseStatus>>,
    #[serde(default)]
    pub edge_rules: Vec<EdgeRule>,
    pub sla: SlaTable,
    #[serde(default)]
    pub signal_slas: SignalSlaTargets,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl LifecyclePolicy {
    pub fn standard() -> Self {
        use CaseStatus::*;

        let edges = BTreeMap::from([
            (Submitted, BTreeSet::from([UnderReview, Assigned, Rejected])),
            (
                UnderReview,
                BTreeSet::from([Investigation, PendingDocumentation, Resolved, Rejected, Assigned]),
            ),
            (
                Assigned,
                BTreeSet::from([Investigation, UnderReview, PendingDocumentation]),
            ),
            (
                Investigation,
                BTreeSet::from([PendingDocumentation, UnderReview, Resolved, Rejected]),
            ),
            (
                PendingDocumentation,
                BTreeSet::from([UnderReview, Investigation, Resolved]),
            ),
            (Resolved, BTreeSet::from([Closed])),
            (Rejected, BTreeSet::from([Closed])),
            (Closed, BTreeSet::new()),
        ]);

        Self {
            edges,
            edge_rules: standard_edge_rules(),
            sla: SlaTable::standard(),
            signal_slas: SignalSlaTargets::default(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let policy: Self = serde_json::from_str(raw)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for (from, targets) in &self.edges {
            for status in std::iter::once(from).chain(targets.iter()) {
                if !status.is_lifecycle_stage() {
                    return Err(PolicyError::NotALifecycleStage(*status));
                }
            }
        }

        if self
            .edges
            .get(&CaseStatus::Closed)
            .map(|targets| !targets.is_empty())
            .unwrap_or(false)
        {
            return Err(PolicyError::TerminalHasEdges(CaseStatus::Closed));
        }

        if let Some(rule) = self
            .edge_rules
            .iter()
            .find(|rule| !self.permits(rule.from, rule.to))
        {
            return Err(PolicyError::UnknownEdge {
                from: rule.from,
                to: rule.to,
            });
        }

        if let Some(missing) = CaseStatus::lifecycle_stages()
            .into_iter()
            .find(|status| !self.sla.base_days.contains_key(status))
        {
            return Err(PolicyError::MissingBaseDays(missing));
        }

        if let Some((status, days)) = self
            .sla
            .base_days
            .iter()
            .find(|(_, days)| **days > MAX_BASE_DAYS)
        {
            return Err(PolicyError::BaseDaysOutOfRange {
                status: *status,
                days: *days,
            });
        }

        for (priority, value) in &self.sla.priority_multipliers {
            if !value.is_finite() || *value <= 0.0 || *value > MAX_MULTIPLIER {
                return Err(PolicyError::InvalidMultiplier {
                    priority: *priority,
                    value: *value,
                });
            }
        }

        // a more severe priority never gets a longer deadline
        let ordered = Priority::ordered();
        for pair in ordered.windows(2) {
            let (more_severe, less_severe) = (pair[0], pair[1]);
            if self.sla.multiplier_for(more_severe) > self.sla.multiplier_for(less_severe) {
                return Err(PolicyError::MultipliersOutOfOrder {
                    more_severe,
                    less_severe,
                });
            }
        }

        let targets = [
            ("acknowledgment", self.signal_slas.acknowledgment_days),
            ("first_response", self.signal_slas.first_response_days),
            ("investigation", self.signal_slas.investigation_days),
        ];
        if let Some((sla, days)) = targets
            .into_iter()
            .find(|(_, days)| *days > MAX_SIGNAL_TARGET_DAYS)
        {
            return Err(PolicyError::SignalTargetOutOfRange { sla, days });
        }

        let ratio = self.signal_slas.at_risk_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(PolicyError::InvalidAtRiskRatio(ratio));
        }

        Ok(())
    }

    pub fn permits(&self, from: CaseStatus, to: CaseStatus) -> bool {
        self.edges
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    pub fn targets(&self, from: CaseStatus) -> Vec<CaseStatus> {
        self.edges
            .get(&from)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rule_for(&self, from: CaseStatus, to: CaseStatus) -> Option<&EdgeRule> {
        self.edge_rules
            .iter()
            .find(|rule| rule.from == from && rule.to == to)
    }

    pub fn knows(&self, status: CaseStatus) -> bool {
        self.edges.contains_key(&status)
    }
}

fn staff_roles() -> BTreeSet<Role> {
    BTreeSet::from([
        Role::Steward,
        Role::Officer,
        Role::Staff,
        Role::Admin,
        Role::System,
    ])
}

fn decision_roles() -> BTreeSet<Role> {
    BTreeSet::from([Role::Officer, Role::Staff, Role::Admin, Role::System])
}

fn standard_edge_rules() -> Vec<EdgeRule> {
    use CaseStatus::*;

    let routine = |from, to| EdgeRule {
        from,
        to,
        allowed_roles: Some(staff_roles()),
        requires_documentation: false,
        blocks_on_critical_signals: false,
    };
    let resolution = |from| EdgeRule {
        from,
        to: Resolved,
        allowed_roles: Some(decision_roles()),
        requires_documentation: true,
        blocks_on_critical_signals: false,
    };
    let rejection = |from, blocks| EdgeRule {
        from,
        to: Rejected,
        allowed_roles: Some(decision_roles()),
        requires_documentation: false,
        blocks_on_critical_signals: blocks,
    };
    let closure = |from| EdgeRule {
        from,
        to: Closed,
        allowed_roles: Some(decision_roles()),
        requires_documentation: false,
        blocks_on_critical_signals: true,
    };

    vec![
        routine(Submitted, UnderReview),
        routine(Submitted, Assigned),
        rejection(Submitted, false),
        routine(UnderReview, Investigation),
        routine(UnderReview, PendingDocumentation),
        resolution(UnderReview),
        rejection(UnderReview, true),
        routine(UnderReview, Assigned),
        routine(Assigned, Investigation),
        routine(Assigned, UnderReview),
        routine(Assigned, PendingDocumentation),
        routine(Investigation, PendingDocumentation),
        routine(Investigation, UnderReview),
        resolution(Investigation),
        rejection(Investigation, true),
        // members hand documentation back for review themselves
        EdgeRule {
            from: PendingDocumentation,
            to: UnderReview,
            allowed_roles: None,
            requires_documentation: false,
            blocks_on_critical_signals: false,
        },
        routine(PendingDocumentation, Investigation),
        resolution(PendingDocumentation),
        closure(Resolved),
        closure(Rejected),
    ]
}
