use std::error::Error;

mod common;

const SRC: &str = "class box
    v : int

    func get
        ret @v
    end
end

func main
    b := new box
    ret b.get
end";

#[test]
fn compile_member_function_receives_self() -> Result<(), Box<dyn Error>> {
    let ir = common::compile(SRC)?;
    assert!(ir.contains("%class.box* %self"));
    Ok(())
}
