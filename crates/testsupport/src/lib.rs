//! Shared fixtures: the demo movie catalog, the employee tables, and the
//! vector/spatial sample data the extension packs are exercised with.

use dataset::{DataSet, MemoryAdapter, Table};
use extensions::{simsearch, spatial, SimSearchPack, SpatialPack};
use schema::{Field, FieldMode};
use std::sync::Arc;
use types::{Date, FieldType, Value};

pub fn int(v: i64) -> Value {
    Value::Int(v)
}

pub fn text(v: &str) -> Value {
    Value::Str(v.into())
}

pub fn date(year: i32, month: u8, day: u8) -> Value {
    Value::Date(Date::new(year, month, day))
}

fn movie_fields() -> Vec<Field> {
    vec![
        Field::new("mid", FieldType::Integer),
        Field::new("title", FieldType::String),
        Field::new("year", FieldType::Integer),
    ]
}

/// The movie catalog: an `animation` and a `musical` table sharing ids for
/// the titles present in both genres.
pub fn demo_dataset() -> DataSet {
    let mut ds = with_packs(DataSet::new("demo"));
    let animation = Table::new(
        "animation",
        movie_fields(),
        vec![
            vec![int(1234), text("Toy Story"), int(1995)],
            vec![int(4567), text("Balto"), int(1995)],
            vec![int(6789), text("Swan Princess"), int(1994)],
            vec![int(1011), text("Aladdin"), int(1992)],
            vec![int(1235), text("Snow White and the Seven Dwarfs"), int(1937)],
        ],
    );
    let musical = Table::new(
        "musical",
        movie_fields(),
        vec![
            vec![int(1235), text("Snow White and the Seven Dwarfs"), int(1937)],
            vec![int(1011), text("Aladdin"), int(1992)],
            vec![int(9800), text("Singin' in the Rain"), int(1952)],
            vec![int(9858), text("American in Paris"), int(1951)],
        ],
    );
    ds.add_adapter(Arc::new(
        MemoryAdapter::new("demo")
            .with_table(animation)
            .with_table(musical),
    ));
    ds
}

fn employee_fields() -> Vec<Field> {
    vec![
        Field::new("employee_id", FieldType::Integer),
        Field::new("full_name", FieldType::String),
        Field::new("employment_date", FieldType::Date),
        Field::new("manager_id", FieldType::Integer),
        Field::builder()
            .name("roles")
            .ty(FieldType::String)
            .mode(FieldMode::Repeated)
            .build(),
    ]
}

/// The three-row employees table.
pub fn employees_dataset() -> DataSet {
    let mut ds = with_packs(DataSet::new("employees"));
    let employees = Table::new(
        "employees",
        employee_fields(),
        vec![
            vec![int(1234), text("Tom Tompson"), date(2009, 1, 17)],
            vec![int(4567), text("Sally Sanders"), date(2010, 2, 24), int(1234)],
            vec![
                int(8901),
                text("Mark Markty"),
                date(2010, 3, 1),
                int(1234),
                Value::List(vec![text("sales"), text("marketing")]),
            ],
        ],
    );
    ds.add_adapter(Arc::new(MemoryAdapter::new("employees").with_table(employees)));
    ds
}

/// Employees with embedding vectors, for similarity queries.
pub fn vectors_dataset() -> DataSet {
    let mut ds = with_packs(DataSet::new("vectors"));
    let vector_ty = ds
        .registry()
        .type_id("VECTOR")
        .expect("simsearch pack installs VECTOR");
    let mut fields = employee_fields();
    fields.push(Field::new("vector", FieldType::Extension(vector_ty)));
    let employees = Table::new(
        "employees_with_vectors",
        fields,
        vec![
            vec![
                int(1234),
                text("Tom Tompson"),
                date(2009, 1, 17),
                Value::Null,
                Value::List(vec![]),
                simsearch::vector(vector_ty, [1.0, 2.0, 3.0, 4.0]),
            ],
            vec![
                int(4567),
                text("Sally Sanders"),
                date(2010, 2, 24),
                int(1234),
                Value::List(vec![]),
                simsearch::vector(vector_ty, [4.0, 5.0, 6.0, 7.0]),
            ],
            vec![
                int(8901),
                text("Mark Markty"),
                date(2010, 3, 1),
                int(1234),
                Value::List(vec![text("sales"), text("marketing")]),
                simsearch::vector(vector_ty, [8.0, 9.0, 0.0, 1.0]),
            ],
        ],
    );
    ds.add_adapter(Arc::new(MemoryAdapter::new("vectors").with_table(employees)));
    ds
}

/// Points and circles for the spatial pack.
pub fn spatial_dataset() -> DataSet {
    let mut ds = with_packs(DataSet::new("spatial"));
    let point_ty = ds.registry().type_id("POINT").expect("spatial installs POINT");
    let circle_ty = ds
        .registry()
        .type_id("CIRCLE")
        .expect("spatial installs CIRCLE");
    let points = Table::new(
        "points",
        vec![
            Field::new("pid", FieldType::Integer),
            Field::new("point", FieldType::Extension(point_ty)),
        ],
        vec![
            vec![int(1234), spatial::point(point_ty, 0.0, 0.0)],
            vec![int(4567), spatial::point(point_ty, 1.0, 2.0)],
            vec![int(8901), spatial::point(point_ty, 10.0, 3.0)],
        ],
    );
    let circles = Table::new(
        "circles",
        vec![
            Field::new("cid", FieldType::Integer),
            Field::new("circle", FieldType::Extension(circle_ty)),
        ],
        vec![
            vec![int(1001), spatial::circle(circle_ty, 3.0, 4.0, 5.0)],
            vec![int(1002), spatial::circle(circle_ty, 1.0, 1.0, 10.0)],
            vec![int(1003), spatial::circle(circle_ty, 10.0, 10.0, 100.0)],
        ],
    );
    ds.add_adapter(Arc::new(
        MemoryAdapter::new("spatial")
            .with_table(points)
            .with_table(circles),
    ));
    ds
}

fn with_packs(mut ds: DataSet) -> DataSet {
    ds.install_pack(&SimSearchPack).expect("fresh registry");
    ds.install_pack(&SpatialPack).expect("fresh registry");
    ds
}

/// Convenient re-exports for integration tests.
pub mod prelude {
    pub use crate::{date, demo_dataset, employees_dataset, int, spatial_dataset, text,
        vectors_dataset};
    pub use common::prelude::*;
    pub use dataset::{DataSet, MemoryAdapter, Query, Table};
    pub use expr::Expr;
}
