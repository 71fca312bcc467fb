/// Atomically bumps the per-thread sequence and writes the payload as both
/// the latest snapshot and a history entry.
///
/// KEYS: seq, latest, history prefix. ARGV: payload, ttl seconds (0 keeps
/// the keys forever).
pub const LUA_SAVE: &str = r#"
local seq = redis.call('INCR', KEYS[1])
local hist_key = KEYS[3] .. ':' .. seq
redis.call('SET', KEYS[2], ARGV[1])
redis.call('SET', hist_key, ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl > 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
  redis.call('EXPIRE', KEYS[2], ttl)
  redis.call('EXPIRE', hist_key, ttl)
end
return seq
"#;
