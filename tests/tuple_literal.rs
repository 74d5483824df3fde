use std::error::Error;

mod common;

const SRC: &str = "func main
    t := (1, 2.0)
    ret 0
end";

#[test]
fn compile_tuple_literal_allocates_and_stores() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("malloc { i64, double }, i64 1"));
    assert!(ir.contains("getelementptr"));
    assert!(ir.contains("store i64 1"));
    assert!(ir.contains("store double"));
    Ok(())
}
