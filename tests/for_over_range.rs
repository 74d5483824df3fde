use std::error::Error;

mod common;

const SRC: &str = "func p(x: int)
    ret x
end

func main
    for i in 0..3
        p(i)
    end
    ret 0
end";

#[test]
fn compile_for_over_range() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    assert!(ir.contains("for.cond"));
    assert!(ir.contains("for.body"));
    // `..` is exclusive
    assert!(ir.contains("icmp slt i64"));
    Ok(())
}
