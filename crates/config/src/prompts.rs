//! Built-in prompt texts and route samples (Vietnamese shop persona)

/// Sales assistant persona used as the base system message
pub const SYSTEM_PROMPT: &str = "Bạn là một nhân viên tư vấn bán hàng chuyên nghiệp tại cửa hàng Quang Đạt Phone. Xưng em và xưng khách hàng là anh/chị. Đôi khi sử dụng icon emoji trong câu trả lời. Nhiệm vụ của bạn là trả lời các câu hỏi của khách hàng một cách rõ ràng, thân thiện và dựa hoàn toàn vào các thông tin sản phẩm được cung cấp bên dưới.
Chỉ sử dụng thông tin có trong dữ liệu. Không tự tạo ra thông tin nếu không được cung cấp.
Nếu không tìm thấy câu trả lời, hãy lịch sự trả lời rằng hiện tại bạn chưa có đủ thông tin để tư vấn chính xác.
Hãy ưu tiên ngắn gọn, dễ hiểu. Nếu khách hỏi gợi ý sản phẩm, hãy liệt kê một vài mẫu phù hợp và lý do tại sao nên chọn.
Luôn giữ thái độ lịch sự, chuyên nghiệp và hỗ trợ hết mình.";

/// Instruction for turning a follow-up into a standalone question
pub const REWRITE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question which might reference context in the chat history, formulate a standalone question which can be understood without the chat history. Do NOT answer the question.";

/// Reply for queries no route matches confidently
pub const CLARIFY_MESSAGE: &str =
    "🤔 Em chưa chắc chắn về câu hỏi này. Anh/chị có thể nói rõ hơn được không?";

/// History speaker labels used by the rewriter
pub const CUSTOMER_LABEL: &str = "Khách";
pub const BOT_LABEL: &str = "Bot";

/// One-shot answer prompt pieces
pub const ASK_HEADER: &str = "Trả lời câu hỏi dựa trên thông tin sau:";
pub const ASK_PASSAGE_LABEL: &str = "Thông tin:";
pub const ASK_FOOTER: &str = "Trả lời: ";

/// Terminal chat strings
pub const CLI_READY: &str = "Hệ thống đã sẵn sàng. Bạn có thể hỏi về sản phẩm. Gõ 'quit' để thoát.";
pub const CLI_INPUT: &str = "💬 Câu hỏi của bạn: ";
pub const CLI_GOODBYE: &str = "Tạm biệt anh/chị! Hẹn gặp lại 😊";

/// Sample phrases for the `products` route
pub const PRODUCT_SAMPLES: &[&str] = &[
    "Điện thoại iPhone 15 Pro Max giá bao nhiêu?",
    "Shop có bán Samsung Galaxy S24 Ultra không?",
    "Cho em xem các mẫu điện thoại dưới 5 triệu",
    "Điện thoại nào chụp ảnh đẹp nhất bên bạn?",
    "Điện thoại đắt nhất của cửa hàng là gì?",
    "iPhone 13 còn màu nào?",
    "Xiaomi Redmi Note 13 có ưu đãi gì không?",
    "So sánh giúp mình iPhone 15 và Galaxy S23",
    "Máy nào pin trâu, chơi game tốt?",
    "Oppo Reno 11 có trả góp không?",
    "Tư vấn cho mình một chiếc điện thoại cho người già",
    "Giá tai nghe AirPods Pro hiện tại là bao nhiêu?",
    "Có máy tính bảng iPad nào đang giảm giá không?",
    "Cấu hình của Galaxy Z Fold5 như thế nào?",
    "Điện thoại màn hình lớn nhất bên bạn là mẫu nào?",
];

/// Sample phrases for the `chitchat` route
pub const CHITCHAT_SAMPLES: &[&str] = &[
    "Xin chào",
    "Chào bạn, hôm nay thế nào?",
    "Bạn tên là gì?",
    "Bạn là ai vậy?",
    "Cảm ơn bạn nhiều nhé",
    "Hôm nay thời tiết đẹp quá",
    "Kể cho mình một câu chuyện cười đi",
    "Bạn có khỏe không?",
    "Tạm biệt nhé",
    "Bạn thích làm gì lúc rảnh?",
    "Mấy giờ rồi nhỉ?",
    "Bạn có người yêu chưa?",
    "Hôm nay mình buồn quá",
    "Ok, mình hiểu rồi",
];

/// Owned copy of a sample list
pub fn to_owned(samples: &[&str]) -> Vec<String> {
    samples.iter().map(|s| s.to_string()).collect()
}
