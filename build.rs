// Build file to produce the abstract assembly parser from src/assem.lalrpop

extern crate lalrpop;

fn main() {
  lalrpop::process_root().unwrap();
}
