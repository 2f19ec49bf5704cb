//! The dataset the shell starts with: the movie catalog, the employee
//! table, and vector/spatial samples for the extension packs.

use dataset::{DataSet, MemoryAdapter, Table};
use extensions::{simsearch, spatial, SimSearchPack, SpatialPack};
use schema::{Field, FieldMode};
use std::sync::Arc;
use types::{Date, FieldType, Value};

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn text(v: &str) -> Value {
    Value::Str(v.into())
}

pub fn demo_dataset() -> DataSet {
    let mut ds = DataSet::new("demo");
    ds.install_pack(&SimSearchPack).expect("fresh registry");
    ds.install_pack(&SpatialPack).expect("fresh registry");
    let vector_ty = ds.registry().type_id("VECTOR").expect("VECTOR registered");
    let point_ty = ds.registry().type_id("POINT").expect("POINT registered");

    let movie_fields = || {
        vec![
            Field::new("mid", FieldType::Integer),
            Field::new("title", FieldType::String),
            Field::new("year", FieldType::Integer),
        ]
    };
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
    let employees = Table::new(
        "employees",
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
        ],
        vec![
            vec![
                int(1234),
                text("Tom Tompson"),
                Value::Date(Date::new(2009, 1, 17)),
            ],
            vec![
                int(4567),
                text("Sally Sanders"),
                Value::Date(Date::new(2010, 2, 24)),
                int(1234),
            ],
            vec![
                int(8901),
                text("Mark Markty"),
                Value::Date(Date::new(2010, 3, 1)),
                int(1234),
                Value::List(vec![text("sales"), text("marketing")]),
            ],
        ],
    );
    let vectors = Table::new(
        "employees_with_vectors",
        vec![
            Field::new("employee_id", FieldType::Integer),
            Field::new("vector", FieldType::Extension(vector_ty)),
        ],
        vec![
            vec![int(1234), simsearch::vector(vector_ty, [1.0, 2.0, 3.0, 4.0])],
            vec![int(4567), simsearch::vector(vector_ty, [4.0, 5.0, 6.0, 7.0])],
            vec![int(8901), simsearch::vector(vector_ty, [8.0, 9.0, 0.0, 1.0])],
        ],
    );
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

    ds.add_adapter(Arc::new(
        MemoryAdapter::new("demo")
            .with_table(animation)
            .with_table(musical)
            .with_table(employees)
            .with_table(vectors)
            .with_table(points),
    ));
    ds
}
