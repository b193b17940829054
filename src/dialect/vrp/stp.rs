//! Spanning-tree intent: global mode, priority, timers, MST region.
//!
//! Per-interface STP tuning is contractually unsupported: the entry point
//! exists so callers get a typed rejection, but no commands are ever issued
//! for it.

use serde::{Deserialize, Serialize};

use crate::dialect::{Command, CommandPlan, Mode};
use crate::error::{EngineError, Result};

const FAMILY: &str = "stp";

/// Spanning-tree protocol mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StpMode {
    /// Classic spanning tree.
    Stp,
    /// Rapid spanning tree.
    Rstp,
    /// Multiple spanning tree; requires region parameters.
    Mstp,
}

impl std::fmt::Display for StpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StpMode::Stp => "stp",
            StpMode::Rstp => "rstp",
            StpMode::Mstp => "mstp",
        };
        f.write_str(name)
    }
}

/// One MST instance-to-VLAN mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MstInstance {
    /// Instance number.
    pub instance: u16,
    /// VLAN list expression, e.g. `10 20 30` or `10 to 20`.
    pub vlans: String,
}

/// Global spanning-tree parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StpParams {
    /// Protocol mode.
    pub mode: StpMode,
    /// Bridge priority, multiple of 4096 in 0..=61440.
    pub priority: u32,
    /// Forward delay in seconds, 4..=30.
    pub forward_delay: u32,
    /// Hello interval in seconds, 1..=10.
    pub hello: u32,
    /// Max age in seconds, 6..=40.
    pub max_age: u32,
    /// MST region name; required (non-empty) for mstp.
    pub region_name: Option<String>,
    /// MST revision, 0..=65535; required for mstp.
    pub revision: Option<u32>,
    /// MST instance mappings.
    #[serde(default)]
    pub instances: Vec<MstInstance>,
}

/// Per-interface tuning parameters. Present for API completeness only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StpInterfaceParams {
    /// Interface name.
    pub interface: String,
}

pub(super) fn validate(params: &StpParams) -> Result<()> {
    if params.priority % 4096 != 0 || params.priority > 61440 {
        return Err(EngineError::parameter(
            FAMILY,
            format!("priority {} must be a multiple of 4096 in 0..=61440", params.priority),
        ));
    }
    if !(4..=30).contains(&params.forward_delay) {
        return Err(EngineError::parameter(
            FAMILY,
            format!("forward_delay {} outside 4..=30", params.forward_delay),
        ));
    }
    if !(1..=10).contains(&params.hello) {
        return Err(EngineError::parameter(
            FAMILY,
            format!("hello {} outside 1..=10", params.hello),
        ));
    }
    if !(6..=40).contains(&params.max_age) {
        return Err(EngineError::parameter(
            FAMILY,
            format!("max_age {} outside 6..=40", params.max_age),
        ));
    }

    if params.mode == StpMode::Mstp {
        match &params.region_name {
            Some(name) if !name.trim().is_empty() => {}
            _ => {
                return Err(EngineError::parameter(
                    FAMILY,
                    "mstp requires a non-empty region_name",
                ))
            }
        }
        match params.revision {
            Some(rev) if rev <= 65535 => {}
            Some(rev) => {
                return Err(EngineError::parameter(
                    FAMILY,
                    format!("revision {} outside 0..=65535", rev),
                ))
            }
            None => return Err(EngineError::parameter(FAMILY, "mstp requires a revision")),
        }
    } else if params.region_name.is_some() || params.revision.is_some() || !params.instances.is_empty()
    {
        return Err(EngineError::parameter(
            FAMILY,
            format!("region parameters are only valid for mstp, not {}", params.mode),
        ));
    }
    Ok(())
}

pub(super) fn plan(params: &StpParams) -> CommandPlan {
    let mut commands = vec![
        Command::new("system-view", Mode::System),
        Command::new(format!("stp mode {}", params.mode), Mode::System),
        Command::new(format!("stp priority {}", params.priority), Mode::System),
        Command::new(
            format!("stp timer forward-delay {}", params.forward_delay),
            Mode::System,
        ),
        Command::new(format!("stp timer root-hello {}", params.hello), Mode::System),
        Command::new(format!("stp timer max-age {}", params.max_age), Mode::System),
    ];

    if params.mode == StpMode::Mstp {
        let region_ctx = Mode::sub("mst-region");
        commands.push(Command::new("stp region-configuration", region_ctx.clone()));
        if let Some(name) = &params.region_name {
            commands.push(Command::new(format!("region-name {}", name), region_ctx.clone()));
        }
        if let Some(revision) = params.revision {
            commands.push(Command::new(
                format!("revision-level {}", revision),
                region_ctx.clone(),
            ));
        }
        for mapping in &params.instances {
            commands.push(Command::new(
                format!("instance {} vlan {}", mapping.instance, mapping.vlans),
                region_ctx.clone(),
            ));
        }
        commands.push(Command::new("active region-configuration", region_ctx));
        commands.push(Command::new("quit", Mode::System));
    }

    commands.push(Command::new("quit", Mode::User));
    CommandPlan::new(commands)
}

/// True if the `display stp` outputs reflect the configured mode and priority.
/// Both are read as labelled `Name : value` fields and compared exactly, so a
/// requested `stp` is not satisfied by an `RSTP` line and priority digits
/// appearing elsewhere in the output do not count.
pub(super) fn stp_applied(brief: &str, global: &str, params: &StpParams) -> bool {
    let combined = format!("{}\n{}", brief, global);
    let mode = params.mode.to_string();
    let mode_seen =
        field_values(&combined, "mode").any(|value| value.eq_ignore_ascii_case(&mode));
    let priority = params.priority.to_string();
    let priority_seen = field_values(&combined, "priority")
        .any(|value| value.split_whitespace().next() == Some(priority.as_str()));
    mode_seen && priority_seen
}

/// Values of `Name : value` lines whose field name mentions `key`.
fn field_values<'a>(output: &'a str, key: &'a str) -> impl Iterator<Item = &'a str> {
    output.lines().filter_map(move |line| {
        let (name, value) = line.split_once(':')?;
        name.to_ascii_lowercase()
            .contains(key)
            .then(|| value.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rstp_params() -> StpParams {
        StpParams {
            mode: StpMode::Rstp,
            priority: 4096,
            forward_delay: 15,
            hello: 2,
            max_age: 20,
            region_name: None,
            revision: None,
            instances: vec![],
        }
    }

    #[test]
    fn priority_boundaries() {
        let mut params = rstp_params();
        params.priority = 4095;
        assert!(validate(&params).is_err());
        params.priority = 61441;
        assert!(validate(&params).is_err());
        params.priority = 61440;
        assert!(validate(&params).is_ok());
        params.priority = 0;
        assert!(validate(&params).is_ok());
    }

    #[test]
    fn timer_ranges() {
        let mut params = rstp_params();
        params.forward_delay = 3;
        assert!(validate(&params).is_err());
        params.forward_delay = 4;
        params.hello = 11;
        assert!(validate(&params).is_err());
        params.hello = 10;
        params.max_age = 41;
        assert!(validate(&params).is_err());
    }

    #[test]
    fn mstp_requires_region() {
        let mut params = rstp_params();
        params.mode = StpMode::Mstp;
        assert!(validate(&params).is_err());
        params.region_name = Some("CAMPUS".into());
        assert!(validate(&params).is_err());
        params.revision = Some(1);
        assert!(validate(&params).is_ok());
    }

    #[test]
    fn region_fields_rejected_outside_mstp() {
        let mut params = rstp_params();
        params.region_name = Some("CAMPUS".into());
        assert!(validate(&params).is_err());
    }

    #[test]
    fn rstp_plan_uses_root_hello_spelling() {
        let plan = plan(&rstp_params());
        let texts: Vec<&str> = plan.commands().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "system-view",
                "stp mode rstp",
                "stp priority 4096",
                "stp timer forward-delay 15",
                "stp timer root-hello 2",
                "stp timer max-age 20",
                "quit",
            ]
        );
    }

    #[test]
    fn mstp_plan_includes_region_block() {
        let mut params = rstp_params();
        params.mode = StpMode::Mstp;
        params.region_name = Some("CAMPUS".into());
        params.revision = Some(7);
        params.instances = vec![MstInstance {
            instance: 1,
            vlans: "10 20".into(),
        }];
        let plan = plan(&params);
        let texts: Vec<&str> = plan.commands().iter().map(|c| c.text.as_str()).collect();
        assert!(texts.contains(&"stp region-configuration"));
        assert!(texts.contains(&"region-name CAMPUS"));
        assert!(texts.contains(&"revision-level 7"));
        assert!(texts.contains(&"instance 1 vlan 10 20"));
        assert!(texts.contains(&"active region-configuration"));
    }

    #[test]
    fn verification_checks_mode_and_priority() {
        let params = rstp_params();
        let global = "Protocol Status    :Enabled\r\nProtocol Mode      :RSTP\r\nPriority           :4096\r\n";
        assert!(stp_applied("", global, &params));
        assert!(!stp_applied("", "Protocol Mode :MSTP\r\nPriority :32768", &params));
    }

    #[test]
    fn classic_stp_is_not_satisfied_by_rstp_output() {
        let mut params = rstp_params();
        params.mode = StpMode::Stp;
        let global = "Protocol Mode      :RSTP\r\nPriority           :4096\r\n";
        assert!(!stp_applied("", global, &params));

        let global = "Protocol Mode      :STP\r\nPriority           :4096\r\n";
        assert!(stp_applied("", global, &params));
    }

    #[test]
    fn priority_must_come_from_the_priority_field() {
        let params = rstp_params();
        // The requested 4096 shows up in an unrelated counter while the
        // actual priority field reads 32768.
        let global =
            "Protocol Mode      :RSTP\r\nTC count           :4096\r\nPriority           :32768\r\n";
        assert!(!stp_applied("", global, &params));
    }
}
