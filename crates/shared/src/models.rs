//! 信贷领域模型
//!
//! 客户、银行、信贷申请三类实体及其输入结构。
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

// ---------------------------------------------------------------------------
// 枚举
// ---------------------------------------------------------------------------

/// 银行类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankType {
    #[default]
    Private,
    Government,
}

/// 信贷产品类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditType {
    #[default]
    Auto,
    Mortgage,
    Commercial,
}

/// 信贷申请状态
///
/// 创建时为 PENDING，决策通过后同一处理单元内转为 APPROVED；
/// 外部状态更新路径也可以将其转为 APPROVED / REJECTED。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl CreditStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// 实体
// ---------------------------------------------------------------------------

/// 客户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// 银行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bank {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "bank_type")]
    pub bank_type: BankType,
    pub is_active: bool,
}

impl Bank {
    pub fn is_government(&self) -> bool {
        self.bank_type == BankType::Government
    }
}

/// 信贷申请
///
/// 不变量：`max_payment >= min_payment`，`term_months > 0`。
/// 缓存反序列化时缺失字段按默认值填充，`id` 为空视为无效缓存。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct Credit {
    pub id: String,
    pub client_id: String,
    pub bank_id: String,
    pub min_payment: f64,
    pub max_payment: f64,
    pub term_months: i32,
    pub credit_type: CreditType,
    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// 输入结构
// ---------------------------------------------------------------------------

/// 创建信贷申请的输入
///
/// 校验只检查请求本身是否合法，不涉及任何存储访问。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_create_payment_range"))]
pub struct CreateCreditInput {
    #[validate(
        length(min = 1, message = "client_id 不能为空"),
        custom(function = "not_blank")
    )]
    pub client_id: String,
    #[validate(
        length(min = 1, message = "bank_id 不能为空"),
        custom(function = "not_blank")
    )]
    pub bank_id: String,
    pub min_payment: f64,
    pub max_payment: f64,
    #[validate(range(min = 1, message = "term_months 必须大于 0"))]
    pub term_months: i32,
    pub credit_type: CreditType,
}

/// 更新信贷申请的输入
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_update_payment_range"))]
pub struct UpdateCreditInput {
    pub min_payment: f64,
    pub max_payment: f64,
    #[validate(range(min = 1, message = "term_months 必须大于 0"))]
    pub term_months: i32,
    pub status: CreditStatus,
}

fn validate_create_payment_range(input: &CreateCreditInput) -> std::result::Result<(), ValidationError> {
    payment_range(input.min_payment, input.max_payment)
}

fn validate_update_payment_range(input: &UpdateCreditInput) -> std::result::Result<(), ValidationError> {
    payment_range(input.min_payment, input.max_payment)
}

fn payment_range(min_payment: f64, max_payment: f64) -> std::result::Result<(), ValidationError> {
    // NaN 与任何值比较都为 false，取反写法让 NaN 也被拒绝
    if !(max_payment >= min_payment) {
        return Err(ValidationError::new("payment_range").with_message(
            format!("max_payment({max_payment}) 不能小于 min_payment({min_payment})").into(),
        ));
    }
    Ok(())
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("不能只包含空白字符".into()));
    }
    Ok(())
}

/// 创建客户的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateClientInput {
    #[validate(
        length(min = 1, max = 255, message = "姓名长度必须在1-255个字符之间"),
        custom(function = "not_blank")
    )]
    pub full_name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    pub birth_date: NaiveDate,
    #[validate(length(min = 2, max = 64, message = "国家代码长度必须在2-64个字符之间"))]
    pub country: String,
}

/// 更新客户的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateClientInput {
    #[validate(
        length(min = 1, max = 255, message = "姓名长度必须在1-255个字符之间"),
        custom(function = "not_blank")
    )]
    pub full_name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    pub birth_date: NaiveDate,
    #[validate(length(min = 2, max = 64, message = "国家代码长度必须在2-64个字符之间"))]
    pub country: String,
}

/// 创建银行的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateBankInput {
    #[validate(
        length(min = 1, max = 255, message = "银行名称长度必须在1-255个字符之间"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[serde(rename = "type")]
    pub bank_type: BankType,
}

/// 更新银行的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateBankInput {
    #[validate(
        length(min = 1, max = 255, message = "银行名称长度必须在1-255个字符之间"),
        custom(function = "not_blank")
    )]
    pub name: String,
    #[serde(rename = "type")]
    pub bank_type: BankType,
}

// ---------------------------------------------------------------------------
// 分页
// ---------------------------------------------------------------------------

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: i64 = 20;

    /// 规范化分页参数：limit <= 0 使用默认值，offset 不允许为负
    pub fn new(limit: i64, offset: i64) -> Self {
        Self::with_default(limit, offset, Self::DEFAULT_LIMIT)
    }

    pub fn with_default(limit: i64, offset: i64, default_limit: i64) -> Self {
        Self {
            limit: if limit <= 0 { default_limit } else { limit },
            offset: offset.max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
