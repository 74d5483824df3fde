use std::error::Error;

mod common;

const SRC: &str = "func main
    var i := 0
    for i < 10
        i = i + 1
    end
    ret i
end";

#[test]
fn compile_while_loop() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;

    assert!(ir.contains("while.cond"));
    assert!(ir.contains("while.body"));
    Ok(())
}
