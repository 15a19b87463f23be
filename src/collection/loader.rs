use std::fs;
use std::path::Path;

use crate::Result;
use crate::collection::types::{DataRow, RequestCollection};

/// 请求集合加载器
///
/// Postman 等外部格式的转换不属于本 crate；实现方只需产出
/// 已解析好的 `RequestCollection`。
pub trait CollectionLoader {
    fn load(&self, path: &Path) -> Result<RequestCollection>;
}

/// 数据行加载器（CSV 解析同样由外部实现）
pub trait RowLoader {
    fn load(&self, path: &Path) -> Result<Vec<DataRow>>;
}

/// 读取本 crate 数据模型的 JSON 序列化形式
pub struct JsonCollectionLoader;

impl CollectionLoader for JsonCollectionLoader {
    fn load(&self, path: &Path) -> Result<RequestCollection> {
        let text = fs::read_to_string(path)?;
        let collection: RequestCollection = serde_json::from_str(&text)?;
        Ok(collection)
    }
}

/// 读取 JSON 数组形式的数据行（每个元素为列名 → 单元格的对象）
pub struct JsonRowLoader;

impl RowLoader for JsonRowLoader {
    fn load(&self, path: &Path) -> Result<Vec<DataRow>> {
        let text = fs::read_to_string(path)?;
        let rows: Vec<DataRow> = serde_json::from_str(&text)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_json_collection_loader() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"templates":[{{"name":"ping","method":"GET","url_raw":"https://example.com/ping"}}]}}"#
        )
        .unwrap();

        let collection = JsonCollectionLoader.load(file.path()).unwrap();
        assert_eq!(collection.len(), 1);
        assert!(collection.get("ping").is_some());
    }

    #[test]
    fn test_json_row_loader() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"BankId":"77","Amount":"10.5"}},{{"BankId":"78","Amount":"11"}}]"#
        )
        .unwrap();

        let rows = JsonRowLoader.load(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("BankId"), Some(&"77".to_string()));
    }

    #[test]
    fn test_loader_missing_file() {
        let result = JsonCollectionLoader.load(Path::new("/nonexistent/collection.json"));
        assert!(result.is_err());
    }
}
