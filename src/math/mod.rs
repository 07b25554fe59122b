pub mod ewma;
pub mod numeric;
