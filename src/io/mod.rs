pub mod export;
pub mod table;

pub use export::{
    groups_geojson, pairs_geojson, write_groups_geojson, write_id_list, write_pairs_csv,
    write_pairs_csv_to, write_pairs_geojson,
};
pub use table::{write_multilook_table, write_multilook_table_to};
