use arrow::datatypes::{DataType, Field, Schema};

pub fn results_schema() -> Schema {
    Schema::new(vec![
        Field::new("ip", DataType::Utf8, false),
        Field::new("discovered_at", DataType::Utf8, true),
        Field::new("available", DataType::Boolean, true),
        Field::new("anonymous", DataType::Boolean, true),
        Field::new("ftps", DataType::Boolean, true),
        Field::new("stream", DataType::Utf8, true),
        Field::new("recorded_at", DataType::Utf8, true),
    ])
}
