pub mod block;
pub mod course;
pub mod enrollment;
pub mod quiz_result;
pub mod user;

pub use block::{BlockInput, BlockKind, CourseBlock, CourseBlockFilter, NewCourseBlock, QuizContent};
pub use course::{Course, CourseFilter, CoursePatch, NewCourse};
pub use enrollment::{Enrollment, EnrollmentFilter, NewEnrollment};
pub use quiz_result::{GrantState, NewQuizResult, QuizResult, QuizResultFilter, QuizResultPatch};
pub use user::{NewUser, Role, User, UserFilter, UserPatch};
