//! Server-side scan-delete scripts
//!
//! Both scripts walk the keyspace with `SCAN` (never `KEYS`) and run
//! atomically on the server. `ARGV[1]` is an already-escaped glob pattern.
//! Each returns the number of keys it deleted.

/// Delete every key matching `ARGV[1]`
pub const DELETE_BY_PATTERN: &str = r#"
local cursor = "0"
local deleted = 0
repeat
  local reply = redis.call("SCAN", cursor, "MATCH", ARGV[1], "COUNT", 1000)
  cursor = reply[1]
  for _, key in ipairs(reply[2]) do
    deleted = deleted + redis.call("DEL", key)
  end
until cursor == "0"
return deleted
"#;

/// Delete every hash matching `ARGV[1]` whose `volatile` field is `"1"`
pub const DELETE_VOLATILE_BY_PATTERN: &str = r#"
local cursor = "0"
local deleted = 0
repeat
  local reply = redis.call("SCAN", cursor, "MATCH", ARGV[1], "COUNT", 1000)
  cursor = reply[1]
  for _, key in ipairs(reply[2]) do
    if redis.call("TYPE", key).ok == "hash" and redis.call("HGET", key, "volatile") == "1" then
      deleted = deleted + redis.call("DEL", key)
    end
  end
until cursor == "0"
return deleted
"#;

/// Number of keys per `DEL` command in batched deletes
pub const DELETE_CHUNK_SIZE: usize = 20;

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bincache::store::fields;

    #[test]
    fn test_scripts_scan_instead_of_keys() {
        for script in [DELETE_BY_PATTERN, DELETE_VOLATILE_BY_PATTERN] {
            assert!(script.contains("\"SCAN\""));
            assert!(!script.contains("\"KEYS\""));
            assert!(script.contains("return deleted"));
        }
    }

    #[test]
    fn test_volatile_script_checks_volatile_field() {
        assert!(DELETE_VOLATILE_BY_PATTERN.contains(&format!("\"{}\") == \"1\"", fields::VOLATILE)));
    }
}
