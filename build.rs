use vergen::EmitBuilder;

fn main() {
    // 构建时间与 git 提交信息，启动时写入日志
    EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit()
        .expect("无法生成构建信息");
}
