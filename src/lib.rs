//! MEICの月別・部門別排出インベントリから、CMAQ入力形式(I/O API)の
//! 時間別格子排出量ファイルを作成する。
//!
//! 1日に1ファイルを作成し、各ファイルには時刻スロットごとに`TFLAG`と
//! 化学種ごとの3次元排出量を記録する。
pub mod config;
pub mod disaggregation;
pub mod driver;
mod errors;
pub mod factors;
pub mod inventory;
pub mod projection;
pub mod readers;
pub mod species;
pub mod writers;

pub use errors::{MeicError, MeicResult};
