//! Parsers turning collector command output into snapshots

use std::collections::BTreeMap;

use crate::models::{EntityId, EntityState, Snapshot};

/// Converts raw command output into a snapshot.
///
/// Errors are plain strings; the collector folds them into a collection
/// failure for its domain.
pub trait OutputParser: Send + Sync {
    /// Parse stdout of one collection run
    fn parse(&self, output: &str) -> Result<Snapshot, String>;
}

/// Line protocol: one entity per line.
///
/// ```text
/// # comment
/// <entity> <status> [metric=value ...] [+flag ...]
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl LineParser {
    fn parse_line(line: &str) -> Result<(EntityId, EntityState), String> {
        let mut tokens = line.split_whitespace();

        let id = tokens.next().ok_or("missing entity id")?;
        let status = tokens
            .next()
            .ok_or_else(|| format!("entity '{id}' has no status"))?;

        let mut state = EntityState::new(status);
        for token in tokens {
            if let Some(flag) = token.strip_prefix('+') {
                if flag.is_empty() {
                    return Err(format!("entity '{id}' has an empty flag"));
                }
                state.flags.insert(flag.to_string());
                continue;
            }

            let (name, raw) = token
                .split_once('=')
                .ok_or_else(|| format!("entity '{id}': unexpected token '{token}'"))?;
            let value: f64 = raw
                .parse()
                .map_err(|_| format!("entity '{id}': metric '{name}' is not a number"))?;
            if !value.is_finite() {
                return Err(format!("entity '{id}': metric '{name}' is not finite"));
            }
            state.metrics.insert(name.to_string(), value);
        }

        Ok((EntityId::new(id), state))
    }
}

impl OutputParser for LineParser {
    fn parse(&self, output: &str) -> Result<Snapshot, String> {
        let mut entities = BTreeMap::new();

        for (number, line) in output.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, state) =
                Self::parse_line(line).map_err(|e| format!("line {}: {e}", number + 1))?;
            if entities.insert(id.clone(), state).is_some() {
                return Err(format!("line {}: duplicate entity '{id}'", number + 1));
            }
        }

        Ok(Snapshot::new(entities))
    }
}
