pub mod reputation;
