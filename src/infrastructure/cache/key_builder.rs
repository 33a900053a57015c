//! 缓存键构建器
//!
//! 确定性、命名空间化的缓存键构建，
//! 结构化查询参数先规范化（按键排序）再哈希，
//! 保证字段插入顺序不影响生成的键

use sha2::{Digest, Sha256};

use super::CacheNamespace;

/// 稳定哈希输出宽度：截断SHA-256的前16个hex字符（64位）
const STABLE_HASH_LEN: usize = 16;

/// 缓存键构建器
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// 组合完整键：`{prefix}{namespace}:{part}[:{part}...]`
    fn compose(&self, namespace: CacheNamespace, parts: &[&str]) -> String {
        let mut key = format!("{}{}", self.prefix, namespace.as_str());
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    /// 用户缓存键
    pub fn user_key(&self, user_id: &str, suffix: Option<&str>) -> String {
        let user_id = Self::sanitize(user_id);
        match suffix {
            Some(suffix) => {
                let suffix = Self::sanitize(suffix);
                self.compose(CacheNamespace::User, &[&user_id, &suffix])
            }
            None => self.compose(CacheNamespace::User, &[&user_id]),
        }
    }

    /// AI分析结果缓存键
    pub fn analysis_key(&self, analysis_type: &str, content_hash: &str) -> String {
        let analysis_type = Self::sanitize(analysis_type);
        let content_hash = Self::sanitize(content_hash);
        self.compose(CacheNamespace::Analysis, &[&analysis_type, &content_hash])
    }

    /// 推荐结果缓存键
    pub fn recommendations_key(&self, category: &str, filters_hash: &str) -> String {
        let category = Self::sanitize(category);
        let filters_hash = Self::sanitize(filters_hash);
        self.compose(
            CacheNamespace::Recommendations,
            &[&category, &filters_hash],
        )
    }

    /// 配置缓存键
    pub fn config_key(&self, config_type: &str, identifier: Option<&str>) -> String {
        let config_type = Self::sanitize(config_type);
        match identifier {
            Some(identifier) => {
                let identifier = Self::sanitize(identifier);
                self.compose(CacheNamespace::Config, &[&config_type, &identifier])
            }
            None => self.compose(CacheNamespace::Config, &[&config_type]),
        }
    }

    /// 会话缓存键
    pub fn session_key(&self, user_id: &str, session_type: &str) -> String {
        let user_id = Self::sanitize(user_id);
        let session_type = Self::sanitize(session_type);
        self.compose(CacheNamespace::Session, &[&user_id, &session_type])
    }

    /// 端点响应缓存键
    ///
    /// caller为None时身份不纳入键（对应规则未开启vary_by_caller）
    pub fn endpoint_key(&self, caller: Option<&str>, path: &str, query_hash: &str) -> String {
        let caller = Self::sanitize(caller.unwrap_or("anonymous"));
        let path = Self::sanitize(path.trim_start_matches('/'));
        self.compose(CacheNamespace::Endpoint, &[&caller, &path, query_hash])
    }

    /// 某命名空间下某主体的所有键的匹配模式
    ///
    /// 主体后强制分段冒号，`42`的模式不会误匹配`420`等前缀相同的主体
    pub fn subject_pattern(&self, namespace: CacheNamespace, subject: &str) -> String {
        let subject = Self::sanitize(subject);
        format!("{}{}:{}:*", self.prefix, namespace.as_str(), subject)
    }

    /// 某命名空间下的所有键的匹配模式
    pub fn namespace_pattern(&self, namespace: CacheNamespace) -> String {
        format!("{}{}:*", self.prefix, namespace.as_str())
    }

    /// 全局键前缀
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 结构化值的稳定哈希
    ///
    /// 对象键先递归排序，语义相同但插入顺序不同的输入产生相同哈希
    pub fn stable_hash(value: &serde_json::Value) -> String {
        let mut canonical = String::new();
        canonicalize(value, &mut canonical);

        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        hex[..STABLE_HASH_LEN].to_string()
    }

    /// 清洗自由格式的键片段
    ///
    /// 替换键格式中的结构性字符（分隔符、空白、路径分隔），
    /// 防止意外的键冲突或命名空间逃逸
    pub fn sanitize(fragment: &str) -> String {
        fragment
            .chars()
            .map(|c| {
                if c == ':' || c == '/' || c == '\\' || c == '*' || c.is_whitespace() {
                    '_'
                } else {
                    c
                }
            })
            .collect()
    }
}

/// 递归生成规范化的JSON文本（对象键升序）作为哈希输入
fn canonicalize(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format!("{:?}:", key));
                canonicalize(&map[key.as_str()], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> KeyBuilder {
        KeyBuilder::new("wardrobe:")
    }

    #[test]
    fn test_namespaced_keys() {
        let keys = builder();
        assert_eq!(keys.user_key("42", None), "wardrobe:user:42");
        assert_eq!(
            keys.user_key("42", Some("profile")),
            "wardrobe:user:42:profile"
        );
        assert_eq!(
            keys.analysis_key("facial", "abc123"),
            "wardrobe:analysis:facial:abc123"
        );
        assert_eq!(
            keys.session_key("42", "styling"),
            "wardrobe:session:42:styling"
        );
        assert_eq!(
            keys.config_key("styles", None),
            "wardrobe:config:styles"
        );
    }

    #[test]
    fn test_stable_hash_ignores_insertion_order() {
        let a = json!({"season": "fall", "color": "warm", "size": "m"});
        let b = json!({"size": "m", "color": "warm", "season": "fall"});
        assert_eq!(KeyBuilder::stable_hash(&a), KeyBuilder::stable_hash(&b));
    }

    #[test]
    fn test_stable_hash_nested_objects() {
        let a = json!({"filters": {"x": 1, "y": 2}, "page": 1});
        let b = json!({"page": 1, "filters": {"y": 2, "x": 1}});
        assert_eq!(KeyBuilder::stable_hash(&a), KeyBuilder::stable_hash(&b));
    }

    #[test]
    fn test_stable_hash_distinguishes_values() {
        let a = json!({"color": "warm"});
        let b = json!({"color": "cool"});
        assert_ne!(KeyBuilder::stable_hash(&a), KeyBuilder::stable_hash(&b));
    }

    #[test]
    fn test_stable_hash_width() {
        let hash = KeyBuilder::stable_hash(&json!({"a": 1}));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sanitize_structural_characters() {
        assert_eq!(KeyBuilder::sanitize("a:b/c d*e"), "a_b_c_d_e");
        // 清洗后无法逃逸到其它命名空间
        let keys = builder();
        let key = keys.user_key("42:admin", None);
        assert_eq!(key, "wardrobe:user:42_admin");
    }

    #[test]
    fn test_identical_lookups_identical_keys() {
        let keys = builder();
        let filters = json!({"occasion": "work", "palette": "autumn"});
        let k1 = keys.recommendations_key("outfits", &KeyBuilder::stable_hash(&filters));
        let k2 = keys.recommendations_key("outfits", &KeyBuilder::stable_hash(&filters));
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_subject_pattern() {
        let keys = builder();
        assert_eq!(
            keys.subject_pattern(CacheNamespace::User, "42"),
            "wardrobe:user:42:*"
        );
        assert_eq!(
            keys.namespace_pattern(CacheNamespace::Analysis),
            "wardrobe:analysis:*"
        );
    }

    /// 主体模式以分段冒号结尾，不会把前缀相同的其它主体键纳入匹配
    #[test]
    fn test_subject_pattern_does_not_cover_longer_subjects() {
        let keys = builder();
        let pattern = keys.subject_pattern(CacheNamespace::User, "42");
        let other_subject_key = keys.user_key("420", Some("profile"));
        // glob前缀为 wardrobe:user:42: ，user:420 的键不在其下
        let glob_prefix = pattern.trim_end_matches('*');
        assert!(!other_subject_key.starts_with(glob_prefix));
        assert!(keys.user_key("42", Some("profile")).starts_with(glob_prefix));
    }
}
