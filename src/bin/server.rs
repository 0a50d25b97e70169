//! Chat Recall server binary.
//! Run with: cargo run --bin chat-recall-server

use std::process::ExitCode;

use chat_recall::start_chat_recall;

fn main() -> ExitCode {
    start_chat_recall::run()
}
