use std::error::Error;

mod common;

const SRC: &str = "func main
    n := 1
    ret case n
    when 0 then 10
    when 1, 2 then 20
    else 30
    end
end";

#[test]
fn compile_switch_expression_as_equality_chain() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    assert!(ir.contains("icmp eq i64"));
    assert!(ir.contains("case.when"));
    assert!(ir.contains("phi i64"));
    Ok(())
}
