//! The eight life-logging schemas provisioned into a user's workspace

use super::types::{EntityTypeDefinition, PropertyDefinition as P, RollupFunction};

pub const GOALS: &str = "Goals";
pub const TODOS: &str = "Todos";
pub const MAIN_RECORDS: &str = "MainRecords";
pub const ACTIVITY_DETAILS: &str = "ActivityDetails";
pub const DAILY_STATUS: &str = "DailyStatus";
pub const HAPPY_THINGS: &str = "HappyThings";
pub const QUOTES: &str = "Quotes";
pub const KNOWLEDGE: &str = "Knowledge";

const PRIORITIES: &[(&str, &str)] = &[("High", "red"), ("Medium", "yellow"), ("Low", "green")];

const MOODS: &[(&str, &str)] = &[
    ("Great", "green"),
    ("Good", "blue"),
    ("Okay", "gray"),
    ("Low", "orange"),
    ("Bad", "red"),
];

/// Entity definitions in declaration order
pub fn lifelog_entities() -> Vec<EntityTypeDefinition> {
    vec![
        goals(),
        todos(),
        main_records(),
        activity_details(),
        daily_status(),
        happy_things(),
        quotes(),
        knowledge(),
    ]
}

fn goals() -> EntityTypeDefinition {
    EntityTypeDefinition::new(GOALS, "goals", "Goals")
        .with(P::title("Name"))
        .with(P::text("Description"))
        .with(P::select(
            "Status",
            &[
                ("Not Started", "gray"),
                ("In Progress", "blue"),
                ("Completed", "green"),
                ("Paused", "yellow"),
                ("Abandoned", "red"),
            ],
        ))
        .with(P::select(
            "Category",
            &[
                ("Health", "green"),
                ("Career", "blue"),
                ("Learning", "purple"),
                ("Relationships", "pink"),
                ("Finance", "yellow"),
                ("Hobby", "orange"),
            ],
        ))
        .with(P::select("Priority", PRIORITIES))
        .with(P::date("StartDate"))
        .with(P::date("TargetDate"))
        .with(P::percent("Progress"))
        .with(P::self_relation("SubGoals", GOALS, "ParentGoal"))
        .with(P::created_time("Created"))
        .with(P::last_edited_time("LastEdited"))
}

fn todos() -> EntityTypeDefinition {
    EntityTypeDefinition::new(TODOS, "todos", "Todos")
        .with(P::title("Title"))
        .with(P::text("Description"))
        .with(P::select(
            "Status",
            &[
                ("To Do", "gray"),
                ("In Progress", "blue"),
                ("Done", "green"),
                ("Blocked", "red"),
            ],
        ))
        .with(P::select("Priority", PRIORITIES))
        .with(P::date("DueDate"))
        .with(P::date("PlannedDate"))
        .with(P::number("EstimatedDuration"))
        .with(P::multi_select(
            "Tags",
            &[
                ("Work", "blue"),
                ("Personal", "green"),
                ("Errand", "orange"),
                ("Study", "purple"),
            ],
        ))
        .with(P::checkbox("Completed"))
        .with(P::dual_relation("RelatedGoal", GOALS, "RelatedTodos"))
        .with(P::relation("RelatedMainRecords", MAIN_RECORDS))
        .with(P::rollup(
            "ActualDuration",
            "ActivityDetails",
            "Duration",
            RollupFunction::Sum,
        ))
        .with(P::self_relation("BlockingTodos", TODOS, "BlockedBy"))
        .with(P::created_time("Created"))
}

fn main_records() -> EntityTypeDefinition {
    EntityTypeDefinition::new(MAIN_RECORDS, "mainRecords", "Main Records")
        .with(P::title("Name"))
        .with(P::date("Date"))
        .with(P::text("Summary"))
        .with(P::select("Mood", MOODS))
        .with(P::number("EnergyLevel"))
        .with(P::relation("RelatedTodos", TODOS))
        .with(P::rollup(
            "TotalTime",
            "ActivityDetails",
            "Duration",
            RollupFunction::Sum,
        ))
        .with(P::rollup(
            "ActivityCount",
            "ActivityDetails",
            "Name",
            RollupFunction::Count,
        ))
        .with(P::created_time("Created"))
}

fn activity_details() -> EntityTypeDefinition {
    EntityTypeDefinition::new(ACTIVITY_DETAILS, "activityDetails", "Activity Details")
        .with(P::title("Name"))
        .with(P::select(
            "ActivityType",
            &[
                ("Work", "blue"),
                ("Study", "purple"),
                ("Exercise", "green"),
                ("Rest", "gray"),
                ("Social", "pink"),
                ("Entertainment", "orange"),
                ("Chores", "brown"),
            ],
        ))
        .with(P::date("StartTime"))
        .with(P::date("EndTime"))
        .with(P::number("Duration"))
        .with(P::text("Notes"))
        .with(P::dual_relation("RelatedGoal", GOALS, "ActivityDetails"))
        .with(P::dual_relation("RelatedTodo", TODOS, "ActivityDetails"))
        .with(P::dual_relation(
            "RelatedMainRecord",
            MAIN_RECORDS,
            "ActivityDetails",
        ))
        .with(P::created_time("Created"))
}

fn daily_status() -> EntityTypeDefinition {
    EntityTypeDefinition::new(DAILY_STATUS, "dailyStatus", "Daily Status")
        .with(P::title("Name"))
        .with(P::date("Date"))
        .with(P::select("Mood", MOODS))
        .with(P::number("EnergyLevel"))
        .with(P::number("SleepHours"))
        .with(P::select(
            "StressLevel",
            &[("High", "red"), ("Moderate", "yellow"), ("Low", "green")],
        ))
        .with(P::checkbox("Exercised"))
        .with(P::text("Notes"))
}

fn happy_things() -> EntityTypeDefinition {
    EntityTypeDefinition::new(HAPPY_THINGS, "happyThings", "Happy Things")
        .with(P::title("Content"))
        .with(P::date("Date"))
        .with(P::multi_select(
            "Category",
            &[
                ("Family", "pink"),
                ("Friends", "blue"),
                ("Work", "gray"),
                ("Nature", "green"),
                ("Food", "orange"),
                ("Achievement", "yellow"),
            ],
        ))
        .with(P::number("Intensity"))
        .with(P::text("Notes"))
        .with(P::created_time("Created"))
}

fn quotes() -> EntityTypeDefinition {
    EntityTypeDefinition::new(QUOTES, "quotes", "Quotes")
        .with(P::title("Content"))
        .with(P::text("Author"))
        .with(P::text("Source"))
        .with(P::multi_select(
            "Tags",
            &[
                ("Motivation", "red"),
                ("Wisdom", "purple"),
                ("Life", "green"),
                ("Work", "blue"),
            ],
        ))
        .with(P::checkbox("Favorite"))
        .with(P::created_time("Created"))
}

fn knowledge() -> EntityTypeDefinition {
    EntityTypeDefinition::new(KNOWLEDGE, "knowledge", "Knowledge")
        .with(P::title("Title"))
        .with(P::select(
            "Category",
            &[
                ("Technology", "blue"),
                ("Science", "purple"),
                ("Humanities", "brown"),
                ("Skills", "green"),
                ("Other", "gray"),
            ],
        ))
        .with(P::multi_select("Tags", &[]))
        .with(P::text("Content"))
        .with(P::text("SourceUrl"))
        .with(P::checkbox("Mastered"))
        .with(P::dual_relation("RelatedGoals", GOALS, "RelatedKnowledge"))
        .with(P::created_time("Created"))
        .with(P::last_edited_time("LastEdited"))
}
