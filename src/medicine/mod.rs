pub mod reminder;
pub mod store;

pub use reminder::{describe, MedicineReminder};
pub use store::{normalize_time, Medicine, MedicineStore, MedicineUpdate, NewMedicine, SortKey};
