pub mod move_rows;
