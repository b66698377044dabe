pub mod header;
pub mod utils;

pub use header::draw_header;
pub use utils::{
  ed_status_color, esi_color, lab_status_color, priority_color, format_waiting, truncate,
};
