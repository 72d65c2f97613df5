pub mod committees;
