//! Row mapping between Postgres and [`Value`]s.

use crate::Value;
use crate::error::DbError;
use accord_schema::LogicalType;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use postgres_types::{FromSql, IsNull, ToSql, Type as PgTypeInfo};

/// A row of data as column name → value pairs, in column order.
pub type Row = IndexMap<String, Value>;

/// Build a [`Row`] from `name => value` pairs.
///
/// ```
/// let row = accord::row! { "id" => 1, "name" => "a" };
/// assert_eq!(row["name"], accord::Value::from("a"));
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::Row::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $( row.insert(::std::string::String::from($name), $crate::Value::from($value)); )+
        row
    }};
}

/// Raw bytes of a JSON or JSONB column.
struct JsonRaw(Option<Vec<u8>>);

impl<'a> FromSql<'a> for JsonRaw {
    fn from_sql(
        _ty: &PgTypeInfo,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(JsonRaw(Some(raw.to_vec())))
    }

    fn from_sql_null(_ty: &PgTypeInfo) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(JsonRaw(None))
    }

    fn accepts(ty: &PgTypeInfo) -> bool {
        *ty == PgTypeInfo::JSON || *ty == PgTypeInfo::JSONB
    }
}

/// Decode a tokio-postgres row positionally, one logical type per column.
pub fn decode_row(
    pg_row: &tokio_postgres::Row,
    columns: &[LogicalType],
) -> Result<Vec<Value>, DbError> {
    if pg_row.len() != columns.len() {
        return Err(DbError::UnexpectedResult(format!(
            "expected {} columns, got {}",
            columns.len(),
            pg_row.len()
        )));
    }

    columns
        .iter()
        .enumerate()
        .map(|(idx, ty)| decode_value(pg_row, idx, ty))
        .collect()
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &LogicalType,
) -> Result<Value, DbError> {
    let column = &row.columns()[idx];
    let read_error = |e: tokio_postgres::Error| DbError::Decode {
        column: column.name().to_string(),
        message: e.to_string(),
    };

    // Integers are read at their live width and converted afterwards, so a
    // column that drifted (say INTEGER declared, BIGINT live) still reads.
    let value = match *ty {
        LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt => {
            match *column.type_() {
                PgTypeInfo::INT2 => row.try_get::<_, Option<i16>>(idx).map(Value::from),
                PgTypeInfo::INT4 => row.try_get::<_, Option<i32>>(idx).map(Value::from),
                _ => row.try_get::<_, Option<i64>>(idx).map(Value::from),
            }
            .map_err(read_error)?
        }
        LogicalType::Decimal { .. } => row
            .try_get::<_, Option<Decimal>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::Double => row
            .try_get::<_, Option<f64>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::Text | LogicalType::Varchar(_) => row
            .try_get::<_, Option<String>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::Boolean => row
            .try_get::<_, Option<bool>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::Date => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::Timestamp => {
            if *column.type_() == PgTypeInfo::TIMESTAMP {
                row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                    .map(|v| Value::from(v.map(|naive| naive.and_utc())))
            } else {
                row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                    .map(Value::from)
            }
            .map_err(read_error)?
        }
        LogicalType::Uuid => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::Json => {
            let raw: JsonRaw = row.try_get(idx).map_err(read_error)?;
            match raw.0 {
                Some(raw) => {
                    // JSONB wire format has a 1-byte version prefix, skip it
                    let json_bytes = if *column.type_() == PgTypeInfo::JSONB
                        && raw.first() == Some(&1)
                    {
                        &raw[1..]
                    } else {
                        &raw[..]
                    };
                    Value::Json(String::from_utf8_lossy(json_bytes).into_owned())
                }
                None => Value::Null,
            }
        }
        LogicalType::Binary => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
        LogicalType::TextArray => row
            .try_get::<_, Option<Vec<String>>>(idx)
            .map(Value::from)
            .map_err(read_error)?,
    };

    value.coerce(ty).ok_or_else(|| DbError::Decode {
        column: column.name().to_string(),
        message: format!("value does not fit {ty}"),
    })
}

/// Wrapper to make our Value usable as a ToSql parameter.
///
/// Integers adapt to the width Postgres inferred for the placeholder.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

fn to_sql_int(
    v: i64,
    ty: &PgTypeInfo,
    out: &mut bytes::BytesMut,
) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
    match *ty {
        PgTypeInfo::INT2 => i16::try_from(v)?.to_sql(ty, out),
        PgTypeInfo::INT4 => i32::try_from(v)?.to_sql(ty, out),
        PgTypeInfo::NUMERIC => Decimal::from(v).to_sql(ty, out),
        PgTypeInfo::FLOAT8 => (v as f64).to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &PgTypeInfo,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::I16(v) => to_sql_int(*v as i64, ty, out),
            Value::I32(v) => to_sql_int(*v as i64, ty, out),
            Value::I64(v) => to_sql_int(*v, ty, out),
            Value::F64(v) => v.to_sql(ty, out),
            Value::Decimal(v) => v.to_sql(ty, out),
            Value::String(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Json(v) => {
                // For JSONB, we need to prepend the version byte
                if *ty == PgTypeInfo::JSONB {
                    out.extend_from_slice(&[1]); // JSONB version 1
                }
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => {
                if *ty == PgTypeInfo::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Date(v) => v.to_sql(ty, out),
            Value::TextArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &PgTypeInfo) -> bool {
        matches!(
            *ty,
            PgTypeInfo::BOOL
                | PgTypeInfo::INT2
                | PgTypeInfo::INT4
                | PgTypeInfo::INT8
                | PgTypeInfo::FLOAT8
                | PgTypeInfo::NUMERIC
                | PgTypeInfo::TEXT
                | PgTypeInfo::VARCHAR
                | PgTypeInfo::BPCHAR
                | PgTypeInfo::NAME
                | PgTypeInfo::BYTEA
                | PgTypeInfo::JSON
                | PgTypeInfo::JSONB
                | PgTypeInfo::UUID
                | PgTypeInfo::TIMESTAMP
                | PgTypeInfo::TIMESTAMPTZ
                | PgTypeInfo::DATE
                | PgTypeInfo::TEXT_ARRAY
                | PgTypeInfo::VARCHAR_ARRAY
        )
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Borrow a parameter slice in the shape tokio-postgres expects.
pub(crate) fn sql_params(params: &[Value]) -> Vec<SqlParam<'_>> {
    params.iter().map(SqlParam).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_row_macro_keeps_order() {
        let row = crate::row! { "b" => 1, "a" => "x", "c" => None::<i64> };
        let names: Vec<_> = row.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(row["c"], Value::Null);
    }

    #[test]
    fn test_int_param_adapts_width() {
        let mut out = BytesMut::new();
        SqlParam(&Value::I32(5))
            .to_sql(&PgTypeInfo::INT8, &mut out)
            .unwrap();
        assert_eq!(out.len(), 8);

        let mut out = BytesMut::new();
        SqlParam(&Value::I64(5))
            .to_sql(&PgTypeInfo::INT2, &mut out)
            .unwrap();
        assert_eq!(out.len(), 2);

        let mut out = BytesMut::new();
        assert!(
            SqlParam(&Value::I64(i64::MAX))
                .to_sql(&PgTypeInfo::INT4, &mut out)
                .is_err()
        );
    }

    #[test]
    fn test_jsonb_param_has_version_byte() {
        let value = Value::json("{\"a\":1}");

        let mut out = BytesMut::new();
        SqlParam(&value).to_sql(&PgTypeInfo::JSONB, &mut out).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(&out[1..], b"{\"a\":1}");

        let mut out = BytesMut::new();
        SqlParam(&value).to_sql(&PgTypeInfo::JSON, &mut out).unwrap();
        assert_eq!(&out[..], b"{\"a\":1}");
    }

    #[test]
    fn test_null_param() {
        let mut out = BytesMut::new();
        let is_null = SqlParam(&Value::Null)
            .to_sql(&PgTypeInfo::TEXT, &mut out)
            .unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }
}
