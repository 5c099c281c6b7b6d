use anyhow::{bail, Context, Result};
use itergate_core::types::AuditEventType;
use serde_json::Value;
use sha2::{Digest, Sha256};

const GENESIS: &str = "genesis";

fn line_hash(line: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(line.as_bytes()))
}

fn read_log(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read audit {path}"))
}

fn entries(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
}

/// Append an event to the audit log, maintaining the hash chain.
///
/// `body` must be a JSON object. `event_type`, `prev_hash` (SHA-256 of the
/// previous line, "genesis" for the first) and `ts` are added to it. Returns
/// the hash of the written line.
pub fn append_audit(path: &str, event_type: AuditEventType, body: &Value) -> Result<String> {
    let content = if std::path::Path::new(path).exists() {
        read_log(path)?
    } else {
        String::new()
    };

    let prev_hash = entries(&content)
        .last()
        .map(|(_, line)| line_hash(line))
        .unwrap_or_else(|| GENESIS.to_string());

    let Some(fields) = body.as_object() else {
        bail!("audit entry must be a JSON object");
    };
    let mut entry = serde_json::Map::new();
    entry.insert("event_type".into(), Value::from(event_type.as_str()));
    for (k, v) in fields {
        entry.insert(k.clone(), v.clone());
    }
    entry.insert("prev_hash".into(), Value::String(prev_hash));
    entry.insert(
        "ts".into(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );

    let entry_json = serde_json::to_string(&Value::Object(entry))?;
    let hash = line_hash(&entry_json);

    let mut new_content = content;
    new_content.push_str(&entry_json);
    new_content.push('\n');
    std::fs::write(path, new_content).with_context(|| format!("cannot write audit {path}"))?;

    Ok(hash)
}

/// Verify the hash chain in an audit log file.
///
/// Returns the number of valid entries.
pub fn verify_chain(path: &str) -> Result<u64> {
    verify_chain_from(path, 0)
}

/// Verify the hash chain starting from entry `from_entry` (0-based).
///
/// Earlier entries are read to rebuild the chain but their links are not
/// checked.
pub fn verify_chain_from(path: &str, from_entry: u64) -> Result<u64> {
    let content = read_log(path)?;

    let mut count = 0u64;
    let mut prev_hash = GENESIS.to_string();

    for (i, line) in entries(&content) {
        let entry: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON at line {}", i + 1))?;

        if count >= from_entry {
            let entry_prev = entry
                .get("prev_hash")
                .and_then(Value::as_str)
                .unwrap_or(GENESIS);
            if entry_prev != prev_hash {
                bail!(
                    "hash chain broken at entry {count}: expected prev_hash '{prev_hash}', got '{entry_prev}'"
                );
            }
        }

        prev_hash = line_hash(line);
        count += 1;
    }

    Ok(count)
}

/// Write a checkpoint recording the chain head and entry count.
pub fn create_checkpoint(audit_path: &str, checkpoint_path: &str) -> Result<Value> {
    let count = verify_chain(audit_path)?;
    let content = read_log(audit_path)?;
    let chain_head = entries(&content)
        .last()
        .map(|(_, line)| line_hash(line))
        .unwrap_or_else(|| GENESIS.to_string());

    let checkpoint = serde_json::json!({
        "audit_file": audit_path,
        "entries": count,
        "chain_head": chain_head,
        "created_at": chrono::Utc::now().to_rfc3339(),
    });

    let json = serde_json::to_string_pretty(&checkpoint)?;
    std::fs::write(checkpoint_path, json)
        .with_context(|| format!("cannot write checkpoint {checkpoint_path}"))?;

    Ok(checkpoint)
}

/// Verify that the audit log still begins with the checkpointed chain.
///
/// Entries appended after the checkpoint do not affect the result.
pub fn verify_checkpoint(audit_path: &str, checkpoint_path: &str) -> Result<bool> {
    let checkpoint_content = std::fs::read_to_string(checkpoint_path)
        .with_context(|| format!("cannot read checkpoint {checkpoint_path}"))?;
    let checkpoint: Value = serde_json::from_str(&checkpoint_content)
        .with_context(|| format!("{checkpoint_path}: invalid checkpoint JSON"))?;

    let expected_count = checkpoint
        .get("entries")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let expected_head = checkpoint
        .get("chain_head")
        .and_then(Value::as_str)
        .unwrap_or(GENESIS);

    let content = read_log(audit_path)?;
    let mut count = 0u64;
    let mut prev_hash = GENESIS.to_string();

    for (i, line) in entries(&content) {
        if count >= expected_count {
            break;
        }
        let entry: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON at line {}", i + 1))?;
        let entry_prev = entry
            .get("prev_hash")
            .and_then(Value::as_str)
            .unwrap_or(GENESIS);
        if entry_prev != prev_hash {
            return Ok(false);
        }
        prev_hash = line_hash(line);
        count += 1;
    }

    Ok(count == expected_count && prev_hash == expected_head)
}

/// Read every entry of a given event type, oldest first.
pub fn read_events(path: &str, event_type: AuditEventType) -> Result<Vec<Value>> {
    let content = read_log(path)?;
    let mut out = Vec::new();
    for (i, line) in entries(&content) {
        let entry: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON at line {}", i + 1))?;
        if entry.get("event_type").and_then(Value::as_str) == Some(event_type.as_str()) {
            out.push(entry);
        }
    }
    Ok(out)
}
