use std::io;

fn main() -> io::Result<()> {
    marktree::run()
}
