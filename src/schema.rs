// Mirrors migrations/schema.sql.

diesel::table! {
    users (clerk_id) {
        clerk_id -> Text,
        role -> Text,
        email -> Text,
        name -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    courses (id) {
        id -> BigInt,
        title -> Text,
        description -> Text,
        resources -> Text,
        creator_id -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    enrollments (id) {
        id -> BigInt,
        course_id -> BigInt,
        student_id -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    course_blocks (id) {
        id -> Text,
        course_id -> BigInt,
        kind -> Text,
        position -> Integer,
        content -> Text,
    }
}

diesel::table! {
    quiz_results (id) {
        id -> BigInt,
        course_id -> BigInt,
        student_id -> Text,
        quiz_block_id -> Text,
        score -> Nullable<Double>,
        answers -> Nullable<Text>,
        assigned_by -> Nullable<Text>,
        completed_at -> Nullable<Timestamp>,
        attempts -> Integer,
        max_attempts -> Integer,
        created_at -> Timestamp,
    }
}

diesel::joinable!(enrollments -> courses (course_id));
diesel::joinable!(course_blocks -> courses (course_id));
diesel::joinable!(quiz_results -> courses (course_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    courses,
    enrollments,
    course_blocks,
    quiz_results,
);
