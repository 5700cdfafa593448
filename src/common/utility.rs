use crate::common::Result;
use crate::datasource::MemoryDataSource;
use crate::types::field::Field;
use crate::types::DataType;
use rand::{random, Rng};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

/// A reproducible generator. Without a seed a random one is drawn.
pub fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(random))
}

/// A random value of the given type. Unknown columns get text.
pub fn create_random_field(rng: &mut ChaCha8Rng, data_type: DataType) -> Field {
    match data_type {
        DataType::Bool => Field::from(rng.gen_range(0..2) == 1),
        DataType::Int => Field::from(rng.gen_range(0..1000_i64)),
        DataType::Float => Field::from(rng.gen_range(0.0..100000.0_f64)),
        DataType::Text | DataType::Unknown => {
            let len = rng.gen_range(1..16);
            // printable chars, no delimiters
            (0..len)
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect::<String>()
                .into()
        }
    }
}

/// `n` random rows for the given column types.
pub fn create_random_rows(types: &[DataType], n: usize, seed: Option<u64>) -> Vec<Vec<Field>> {
    let mut rng = seeded_rng(seed);
    (0..n)
        .map(|_| {
            types
                .iter()
                .map(|data_type| create_random_field(&mut rng, *data_type))
                .collect()
        })
        .collect()
}

/// Creates a memory table with an integer `id` column holding `0..n` followed by
/// random columns of the given types, and returns the inserted rows.
pub fn create_memory_table(
    source: &MemoryDataSource,
    name: &str,
    columns: &[(&str, DataType)],
    n: usize,
    seed: Option<u64>,
) -> Result<Vec<Vec<Field>>> {
    let mut names = vec!["id"];
    names.extend(columns.iter().map(|(column, _)| *column));
    source.create_table(name, &names)?;

    let types: Vec<DataType> = columns.iter().map(|(_, data_type)| *data_type).collect();
    let rows: Vec<Vec<Field>> = create_random_rows(&types, n, seed)
        .into_iter()
        .enumerate()
        .map(|(i, fields)| {
            let mut row = vec![Field::from(i as i64)];
            row.extend(fields);
            row
        })
        .collect();
    source.insert(name, rows.clone())?;
    Ok(rows)
}
