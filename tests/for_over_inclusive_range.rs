use std::error::Error;

mod common;

const SRC: &str = "func p(x: int)
    ret x
end

func main
    for i in 0...3
        p(i)
    end
    ret 0
end";

#[test]
fn compile_for_over_inclusive_range() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    // `...` compares inclusively
    assert!(ir.contains("icmp sle i64"));
    Ok(())
}
