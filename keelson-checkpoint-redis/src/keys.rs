use std::borrow::Cow;

/// Escapes characters that would break a hash tag or a key pattern as `%XX`
/// per UTF-8 byte. Distinct ids always map to distinct key segments.
pub fn encode_thread_id(thread_id: &str) -> Cow<'_, str> {
    if !thread_id.chars().any(needs_escape) {
        return Cow::Borrowed(thread_id);
    }

    let mut out = String::with_capacity(thread_id.len() + 8);
    let mut buf = [0u8; 4];
    for c in thread_id.chars() {
        if needs_escape(c) {
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn needs_escape(c: char) -> bool {
    matches!(c, '{' | '}' | '*' | '?' | '[' | ']' | '%' | '\\') || c.is_whitespace() || c.is_control()
}

/// Keys for one thread. All share a hash tag so the save script stays on
/// one cluster slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadKeys {
    pub seq: String,
    pub latest: String,
    pub hist_prefix: String,
}

impl ThreadKeys {
    pub fn new(namespace: &str, thread_id: &str) -> Self {
        let tag = format!("{{keelson:{namespace}:{}}}", encode_thread_id(thread_id));
        Self {
            seq: format!("{tag}:seq"),
            latest: format!("{tag}:latest"),
            hist_prefix: format!("{tag}:hist"),
        }
    }

    pub fn history(&self, seq: i64) -> String {
        format!("{}:{seq}", self.hist_prefix)
    }
}

/// Sorted set of thread ids scored by last save time in milliseconds.
pub fn index_key(namespace: &str) -> String {
    format!("keelson:{namespace}:threads")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_one_hash_tag() {
        let keys = ThreadKeys::new("prod", "thread-1");
        assert_eq!(keys.seq, "{keelson:prod:thread-1}:seq");
        assert_eq!(keys.latest, "{keelson:prod:thread-1}:latest");
        assert_eq!(keys.history(3), "{keelson:prod:thread-1}:hist:3");
        assert_eq!(index_key("prod"), "keelson:prod:threads");
    }

    #[test]
    fn plain_ids_are_kept_verbatim() {
        assert!(matches!(encode_thread_id("ok-123_abc:x"), Cow::Borrowed("ok-123_abc:x")));
    }

    #[test]
    fn metacharacters_are_escaped() {
        assert_eq!(encode_thread_id("what?"), "what%3F");
        assert_eq!(encode_thread_id("a{b}"), "a%7Bb%7D");
        assert_eq!(encode_thread_id("a b"), "a%20b");
        assert_eq!(encode_thread_id("50%"), "50%25");

        let keys = ThreadKeys::new("prod", "what?");
        assert_eq!(keys.latest, "{keelson:prod:what%3F}:latest");
    }

    #[test]
    fn escaping_never_merges_two_ids() {
        let ids = ["what?", "what%3F", "what", "a*", "a%2A", "a[0]", "line\nbreak"];
        let encoded: std::collections::HashSet<String> =
            ids.iter().map(|id| encode_thread_id(id).into_owned()).collect();
        assert_eq!(encoded.len(), ids.len());
        for key in &encoded {
            assert!(!key.contains(['{', '}', '*', '?', '[', ']', '\n']), "{key:?}");
        }
    }
}
