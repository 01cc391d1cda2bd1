//! Terminal output: a spinner that follows phase changes and coloured
//! tables for statuses, the effective policy and cooldown snapshots.

use chrono::{DateTime, Local, Utc};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use stagehand::action::CooldownSnapshot;
use stagehand::config::Config;
use stagehand::runner::{ActionStatus, Phase};

/// Spinner shown while a runner loop is active.
///
/// Phase changes are printed above the spinner, coloured by phase.
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    yellow: Style,
    dim: Style,
}

impl RunProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    pub fn phase(&self, name: &str, phase: Phase) {
        let style = self.style_for(phase);
        self.pb.println(format!(
            "  {} {name}",
            style.apply_to(format!("{:<8}", phase.label()))
        ));
        if phase == Phase::Working {
            self.pb.set_message(format!("working: {name}"));
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }

    fn style_for(&self, phase: Phase) -> &Style {
        match phase {
            Phase::Working => &self.yellow,
            Phase::Done => &self.green,
            Phase::Waiting | Phase::NotAvailable => &self.dim,
        }
    }
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// "12.5 min left" or "ready".
pub fn describe_cooldown(on_cooldown: bool, remaining_minutes: f64) -> String {
    if on_cooldown {
        format!("{remaining_minutes:.1} min left")
    } else {
        "ready".to_string()
    }
}

pub fn print_statuses(statuses: &[ActionStatus]) {
    let header = Style::new().bold();
    println!();
    println!(
        "{}",
        header.apply_to(format!(
            "{:<24} {:<16} {:<8} {:<8} {:<16} {}",
            "ACTION", "STATE", "PHASE", "ENABLED", "COOLDOWN", "LAST RUN"
        ))
    );
    for status in statuses {
        println!(
            "{:<24} {:<16} {:<8} {:<8} {:<16} {}",
            status.name,
            status.state.to_string(),
            status.phase.label(),
            if status.enabled { "yes" } else { "no" },
            describe_cooldown(status.on_cooldown, status.cooldown_remaining),
            status.last_execution.map(local).unwrap_or_else(|| "-".into()),
        );
    }
}

pub fn print_config(config: &Config) {
    let title = Style::new().cyan().bold();
    let policy = &config.runner;
    println!("{}", title.apply_to("─── Runner ───"));
    println!("  refresh rate        {}s", policy.refresh_rate_seconds);
    println!("  continuous          {}", policy.continuous_running);
    println!(
        "  night sleep         {} ({} - {})",
        if policy.night.enabled { "on" } else { "off" },
        policy.night.start.format("%H:%M"),
        policy.night.end.format("%H:%M"),
    );
    println!(
        "  breaks              {:.0}% chance, {}-{} min, at least {} min apart",
        policy.breaks.chance * 100.0,
        policy.breaks.min_minutes,
        policy.breaks.max_minutes,
        policy.breaks.min_interval_minutes,
    );
    println!(
        "  gap between actions {}-{}s",
        policy.action_gap_min_seconds, policy.action_gap_max_seconds
    );
    println!(
        "  test mode           {} ({}s per action)",
        if policy.test_mode.enabled { "on" } else { "off" },
        policy.test_mode.dummy_execution_seconds,
    );

    println!("{}", title.apply_to("─── Actions ───"));
    if config.actions.is_empty() {
        println!("  (none configured)");
    }
    for (key, action) in &config.actions {
        println!(
            "  {key:<24} {:<8} cooldown {}m, {} retries, wait {}s{}",
            if action.enabled { "enabled" } else { "disabled" },
            action.cooldown_minutes,
            action.max_retries,
            action.default_wait_seconds,
            if action.delay_profiles.is_empty() {
                String::new()
            } else {
                let mut names: Vec<_> = action.delay_profiles.keys().cloned().collect();
                names.sort();
                format!(", profiles: {}", names.join(", "))
            },
        );
    }
}

pub fn print_snapshot(snapshot: &CooldownSnapshot, now: DateTime<Utc>) {
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    if snapshot.records.is_empty() {
        println!("no cooldowns recorded");
        return;
    }
    for (key, record) in &snapshot.records {
        let mut record = record.clone();
        if record.is_ready(now) {
            println!("  {} {key}", green.apply_to("ready   "));
        } else {
            let until = record.end_time.map(local).unwrap_or_else(|| "-".into());
            println!(
                "  {} {key} ({}, until {until})",
                yellow.apply_to("cooling "),
                describe_cooldown(true, record.remaining_minutes(now)),
            );
        }
    }
}
