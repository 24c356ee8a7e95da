/// Lua script for a conditional circuit state write
///
/// The record is a hash whose `version` field is the optimistic concurrency
/// token. A missing key has version 0. New versions come from a generation
/// counter kept beside the record without expiry, so deleting or expiring the
/// record never brings an old version back.
///
/// KEYS[1] = the circuit key
/// KEYS[2] = the generation counter key
/// ARGV[1] = expected version
/// ARGV[2] = ttl (seconds)
/// ARGV[3] = status
/// ARGV[4] = failures
/// ARGV[5] = consecutive successes
/// ARGV[6] = last failure (unix millis, empty for none)
/// ARGV[7] = open until (unix millis, empty for none)
///
/// Returns: the new version, or 0 on version mismatch
pub const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local key = KEYS[1]
local generation_key = KEYS[2]
local expected = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local current = tonumber(redis.call('HGET', key, 'version') or '0')
if current ~= expected then
    return 0
end

local version = redis.call('INCR', generation_key)
if version <= current then
    version = current + 1
    redis.call('SET', generation_key, version)
end

redis.call('HSET', key,
    'status', ARGV[3],
    'failures', ARGV[4],
    'consecutive_successes', ARGV[5],
    'last_failure', ARGV[6],
    'open_until', ARGV[7],
    'version', version)
redis.call('EXPIRE', key, ttl)

return version
"#;

/// Lua script for an unconditional circuit state write
///
/// KEYS[1] = the circuit key
/// KEYS[2] = the generation counter key
/// ARGV[1] = ttl (seconds)
/// ARGV[2..6] = status, failures, consecutive successes, last failure, open until
///
/// Returns: the new version
pub const PUT_SCRIPT: &str = r#"
local key = KEYS[1]
local generation_key = KEYS[2]
local ttl = tonumber(ARGV[1])

local current = tonumber(redis.call('HGET', key, 'version') or '0')
local version = redis.call('INCR', generation_key)
if version <= current then
    version = current + 1
    redis.call('SET', generation_key, version)
end

redis.call('HSET', key,
    'status', ARGV[2],
    'failures', ARGV[3],
    'consecutive_successes', ARGV[4],
    'last_failure', ARGV[5],
    'open_until', ARGV[6],
    'version', version)
redis.call('EXPIRE', key, ttl)

return version
"#;
