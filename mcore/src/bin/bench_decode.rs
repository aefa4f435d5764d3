#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::{env, fs};

use anyhow::bail;
use mcore::measure;

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        bail!("this binary requires exactly 1 argument") // the binary itself is also an arg
    }

    let src = fs::read_to_string(&args[1])?;
    let result = measure::decode(src.trim_end())?;
    println!("{}", measure::result_to_string(&result));
    Ok(())
}
