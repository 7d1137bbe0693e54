pub mod bc;
