use std::collections::HashMap;

/// 变量上下文，一个虚拟用户私有一份
///
/// 分两层存储：`variables` 为每次迭代重建的行数据层，
/// `persistent` 为脚本提升的持久层，跨迭代保留且优先级更高。
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// 全局 + 当前数据行映射出的变量
    variables: HashMap<String, String>,

    /// 脚本通过 collectionVariables.set 提升的变量
    persistent: HashMap<String, String>,
}

impl VariableContext {
    /// 创建新的空变量上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入变量（行数据层）
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// 获取变量值，持久层优先
    pub fn get(&self, key: &str) -> Option<&str> {
        self.persistent
            .get(key)
            .or_else(|| self.variables.get(key))
            .map(|s| s.as_str())
    }

    /// 批量插入变量（行数据层）
    pub fn extend(&mut self, vars: HashMap<String, String>) {
        self.variables.extend(vars);
    }

    /// 将变量提升到持久层，跨迭代存活
    pub fn promote(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.persistent.insert(key.into(), value.into());
    }

    /// 用新的行数据重建变量层，持久层原样保留
    pub fn rebind(&mut self, vars: HashMap<String, String>) {
        self.variables = vars;
    }

    /// 合并：以 self 为基础复制一份，再叠加 overrides
    pub fn merge(&self, overrides: &HashMap<String, String>) -> Self {
        let mut merged = self.clone();
        merged.variables.extend(overrides.clone());
        merged
    }

    /// 变量数量（两层合计，重名只算一次）
    pub fn len(&self) -> usize {
        let overlap = self
            .persistent
            .keys()
            .filter(|k| self.variables.contains_key(*k))
            .count();
        self.variables.len() + self.persistent.len() - overlap
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.persistent.is_empty()
    }
}
