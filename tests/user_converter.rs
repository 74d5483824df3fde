use std::error::Error;

mod common;

const SRC: &str = "class counter
    n : int
end

cast (c: counter): int
    ret 42
end

func main
    c := new counter
    ret c as int
end";

#[test]
fn compile_user_converter() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("call i64 @\"dachs.conv."));
    Ok(())
}
