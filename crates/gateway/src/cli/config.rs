use std::path::Path;

use anyhow::Context;
use ir_domain::config::{Config, ConfigError, ConfigSeverity};

/// Parse and validate the config, printing any issues.
///
/// Returns `false` when at least one error (not warning) was found.
pub fn validate(config: &Config, config_path: &Path) -> bool {
    let issues = config.validate();
    let (report, ok) = render_issues(&issues, config_path);
    print!("{report}");
    ok
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config).context("serializing config")?;
    print!("{output}");
    Ok(())
}

fn render_issues(issues: &[ConfigError], config_path: &Path) -> (String, bool) {
    let path = config_path.display();
    if issues.is_empty() {
        return (format!("Config OK ({path})\n"), true);
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    let mut out = String::new();
    for issue in issues {
        out.push_str(&format!("{issue}\n"));
    }
    out.push_str(&format!(
        "\n{error_count} error(s), {warning_count} warning(s) in {path}\n"
    ));

    (out, error_count == 0)
}
