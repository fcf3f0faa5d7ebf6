/// Lua script for releasing a lock only if the caller still owns it.
///
/// KEYS\[1\] = namespaced lock key
/// ARGV\[1\] = owner token
///
/// Returns 1 if the key was deleted, 0 if it is missing or owned by someone
/// else.
pub const LOCK_RELEASE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;
