//! 参数化查询构造
//!
//! 所有来自用户的过滤值一律作为绑定参数传递，绝不拼接进SQL文本。
//! 时间点枚举是固定常量，行数上限经过夹取后也走绑定参数。

use nlst_core::{FilterSpec, NlstError, Result};

/// 行数上限的允许区间
pub const MIN_LIMIT: i64 = 1_000;
pub const MAX_LIMIT: i64 = 200_000;

/// 绑定参数值
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
}

/// 一条可执行的参数化查询
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl BuiltQuery {
    fn new(sql: String) -> Self {
        Self {
            sql,
            binds: Vec::new(),
        }
    }

    /// 登记一个绑定值，返回其 `$n` 占位符
    fn placeholder(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }
}

/// 把行数上限夹到允许区间内
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(MIN_LIMIT, MAX_LIMIT)
}

/// 查询构造器，基础语句按数据集固定
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    volume_table: String,
    clinical_table: String,
    volume_column: String,
}

impl QueryBuilder {
    pub fn new(volume_table: &str, clinical_table: &str, volume_column: &str) -> Self {
        Self {
            volume_table: volume_table.to_string(),
            clinical_table: clinical_table.to_string(),
            volume_column: volume_column.to_string(),
        }
    }

    /// 体积测量查询：固定时间点枚举约束 + 过滤条件 + 行数上限
    ///
    /// `require_structure` 为真且条件中缺少structure时，在任何I/O
    /// 之前即返回 `InvalidFilter`。
    pub fn volume_query(
        &self,
        spec: &FilterSpec,
        limit: i64,
        require_structure: bool,
    ) -> Result<BuiltQuery> {
        if require_structure && spec.structure.is_none() {
            return Err(NlstError::InvalidFilter(
                "structure is required".to_string(),
            ));
        }

        let mut query = BuiltQuery::new(format!(
            "SELECT patient_id, study_instance_uid, source_segmented_series_uid, \
             segmentation_series_uid, structure, timepoint, age, gender, race, \
             clinical_stage, smoking_status, {} AS volume \
             FROM {} \
             WHERE timepoint IN ('T0', 'T1', 'T2')",
            self.volume_column, self.volume_table,
        ));

        if let Some(structure) = &spec.structure {
            let ph = query.placeholder(BindValue::Text(structure.clone()));
            query.sql.push_str(&format!(" AND structure = {ph}"));
        }
        self.push_in_list(&mut query, "smoking_status", &spec.smoking_status);
        self.push_in_list(&mut query, "gender", &spec.gender);
        self.push_in_list(&mut query, "race", &spec.race);
        self.push_in_list(&mut query, "clinical_stage", &spec.clinical_stage);
        if let Some(min_age) = spec.min_age {
            let ph = query.placeholder(BindValue::Int(min_age));
            query.sql.push_str(&format!(" AND age >= {ph}"));
        }
        if let Some(max_age) = spec.max_age {
            let ph = query.placeholder(BindValue::Int(max_age));
            query.sql.push_str(&format!(" AND age <= {ph}"));
        }

        let ph = query.placeholder(BindValue::Int(clamp_limit(limit)));
        query.sql.push_str(&format!(" ORDER BY timepoint LIMIT {ph}"));
        Ok(query)
    }

    /// 多选条件：每个值一个占位符的 IN 列表
    fn push_in_list(&self, query: &mut BuiltQuery, column: &str, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| query.placeholder(BindValue::Text(v.clone())))
            .collect();
        query
            .sql
            .push_str(&format!(" AND {column} IN ({})", placeholders.join(", ")));
    }

    /// 人口学统计查询
    pub fn patient_query(&self) -> BuiltQuery {
        BuiltQuery::new(format!(
            "SELECT patient_id, age, gender_description, race_description, \
             stage_description, cigsmok_description \
             FROM {}",
            self.clinical_table,
        ))
    }

    /// 去重的解剖结构名列表
    pub fn structures_query(&self) -> BuiltQuery {
        BuiltQuery::new(format!(
            "SELECT DISTINCT structure FROM {} \
             WHERE structure IS NOT NULL ORDER BY structure",
            self.volume_table,
        ))
    }

    /// 下拉框候选项与年龄范围的数据源
    pub fn filter_options_query(&self) -> BuiltQuery {
        BuiltQuery::new(format!(
            "SELECT DISTINCT smoking_status, gender, race, clinical_stage, age \
             FROM {}",
            self.volume_table,
        ))
    }
}
